//! Plugin isolation worker.
//!
//! Speaks the newline-delimited JSON worker protocol on stdio: requests in,
//! responses out, one per line. Diagnostics must go to stderr; stdout carries
//! protocol frames only. The plugin loader spawns one of these per isolated
//! plugin, with the workspace root as its working directory.

use std::io;

use trellis_core::worker::serve_worker;

fn main() -> io::Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();
    serve_worker(stdin.lock(), &mut stdout)
}
