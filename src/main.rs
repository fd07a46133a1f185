use std::process;

use finance_tracker::application::the_app;

fn main() {
    if let Err(err) = the_app() {
        eprintln!("error: {err}");
        process::exit(1);
    }
}
