use std::ffi::OsString;

fn main() {
    let args: Vec<OsString> = std::env::args_os().collect();
    if let Err(err) = tapedeck_core::run(args) {
        eprintln!("tapedeck: {err:#}");
        std::process::exit(1);
    }
}
