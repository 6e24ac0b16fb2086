use std::{fmt, io::Write};

use env_logger::Env;
use log::Level;

/// Installs `env_logger` (`RUST_LOG`, default `info`) with `\r\n` line
/// endings so records stay aligned while the terminal is in raw mode.
pub fn init() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| {
            let timestamp = buf.timestamp();
            let line = render(record.level(), record.target(), record.args());
            write!(buf, "[{} {}", timestamp, line)
        })
        .init();
}

fn render(level: Level, target: &str, args: &fmt::Arguments<'_>) -> String {
    format!("{:<5} {}] {}\r\n", level, target, args)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_end_with_carriage_return_newline() {
        let line = render(Level::Warn, "taskctl::worker", &format_args!("Task '{}' paused.", 3));
        assert_eq!(line, "WARN  taskctl::worker] Task '3' paused.\r\n");
        assert_eq!(line.matches('\n').count(), 1);
    }
}
