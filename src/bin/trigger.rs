//! Default trigger program: shows where to place the breakpoint and waits
//! for Enter so a debugger can be attached in the meantime.

use bpbench::trigger::{ENV_BREAKPOINT_ADDR, ENV_PID};
use std::env;
use std::io::{self, BufRead, Write};

fn main() {
    let pid = env::var(ENV_PID).unwrap_or_else(|_| "?".to_string());
    let addr = env::var(ENV_BREAKPOINT_ADDR).unwrap_or_else(|_| "?".to_string());

    println!("Attach a debugger to process {} and set a hardware", pid);
    println!("execute breakpoint at {}, then press Enter.", addr);
    let _ = io::stdout().flush();

    let mut line = String::new();
    if let Err(e) = io::stdin().lock().read_line(&mut line) {
        eprintln!("Failed to read stdin: {}", e);
        std::process::exit(1);
    }
}
