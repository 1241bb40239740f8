//! Startup banner, gated behind the `server-banner` feature so a
//! headless/embedded build can drop `termcolor`/`itertools` entirely.

use std::io::Write;

use itertools::Itertools;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

use crate::config::AppConfig;

pub fn print(config: &AppConfig) {
    let mut stdout = StandardStream::stdout(ColorChoice::Auto);

    let _ = stdout.set_color(ColorSpec::new().set_fg(Some(Color::Cyan)).set_bold(true));
    let _ = writeln!(stdout, "meshgate");
    let _ = stdout.reset();

    let lines = [
        format!("bridge name : {}", config.bridge.name),
        format!("http port   : {}", config.bridge.http_port),
        format!("listen addr : {}", config.bridge.ipaddress),
    ];
    for line in lines.iter().sorted() {
        let _ = writeln!(stdout, "  {line}");
    }
}
