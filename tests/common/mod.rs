/// Shared code for our test harness.


use lazy_static::lazy_static;
use std::sync::Once;

lazy_static! {
    static ref TRACING_INIT: Once = Once::new();
}

pub fn setup_logging() {
    use tracing_subscriber::{fmt, fmt::time::LocalTime, prelude::*, EnvFilter};
    use time::macros::format_description;

    TRACING_INIT.call_once(|| {
        let timer = LocalTime::new(format_description!("[hour]:[minute]:[second]"));
        let fmt_layer = fmt::layer()
            .compact()
            .with_timer(timer)
            .with_target(false);
        let filter_layer = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new("info"))
            .expect("initializing logging");
        tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt_layer)
            .init();
    });
}

// A scripted stand-in for the stream engine: a shell one-liner that prints the given lines
// on stdout and exits with the given code.
#[allow(dead_code)]
pub fn fake_engine(lines: &[&str], exit_code: i32) -> Vec<String> {
    let mut script = String::new();
    for line in lines {
        script.push_str(&format!("echo '{line}'; "));
    }
    script.push_str(&format!("exit {exit_code}"));
    vec![String::from("/bin/sh"), String::from("-c"), script]
}
