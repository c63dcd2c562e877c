//! Terminal front end: reads commands from stdin, prints window events.

use rdp_bridge_core::client::ConnectionState;
use rdp_bridge_core::{ConnectionStatus, Presentation, SessionControls, WindowEvent};
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Reconnect,
    Fullscreen,
    Keyboard,
    Quit,
}

pub fn parse_command(line: &str) -> Option<Command> {
    match line.trim().to_ascii_lowercase().as_str() {
        "r" | "reconnect" => Some(Command::Reconnect),
        "f" | "fullscreen" => Some(Command::Fullscreen),
        "k" | "keyboard" => Some(Command::Keyboard),
        "q" | "quit" | "close" => Some(Command::Quit),
        _ => None,
    }
}

/// Forward stdin commands to the window. EOF closes the session.
pub async fn read_commands(controls: SessionControls) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                log::warn!("Failed to read stdin: {}", e);
                break;
            }
        };
        match parse_command(&line) {
            Some(Command::Reconnect) => controls.reconnect(),
            Some(Command::Fullscreen) => controls.toggle_fullscreen(),
            Some(Command::Keyboard) => controls.toggle_keyboard(),
            Some(Command::Quit) => break,
            None if line.trim().is_empty() => {}
            None => println!("commands: r(econnect) f(ullscreen) k(eyboard) q(uit)"),
        }
    }
    controls.close();
}

pub fn format_status(status: &ConnectionStatus, label: Option<&str>) -> String {
    let mut line = format!("[{}]", status.state.display_name());
    if let Some(label) = label {
        if status.state == ConnectionState::Connected {
            line.push(' ');
            line.push_str(label);
        }
    }
    if let Some(detail) = &status.detail {
        line.push_str(": ");
        line.push_str(detail);
    }
    line
}

pub fn format_presentation(p: &Presentation) -> String {
    format!(
        "fullscreen {}, keyboard {}",
        if p.fullscreen { "on" } else { "off" },
        if p.keyboard_visible { "shown" } else { "hidden" },
    )
}

/// Print window events until the window goes away.
pub async fn print_events(events: async_channel::Receiver<WindowEvent>, label: Option<String>) {
    while let Ok(event) = events.recv().await {
        match event {
            WindowEvent::StatusChanged(status) => {
                println!("{}", format_status(&status, label.as_deref()))
            }
            WindowEvent::PresentationChanged(p) => println!("{}", format_presentation(&p)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_short_and_long_commands() {
        assert_eq!(parse_command("r"), Some(Command::Reconnect));
        assert_eq!(parse_command(" Fullscreen \n"), Some(Command::Fullscreen));
        assert_eq!(parse_command("k"), Some(Command::Keyboard));
        assert_eq!(parse_command("close"), Some(Command::Quit));
        assert_eq!(parse_command("bogus"), None);
    }

    #[test]
    fn status_line_shows_detail() {
        let mut status = ConnectionStatus::new(ConnectionState::Errored);
        status.detail = Some("connection error".into());
        assert_eq!(
            format_status(&status, Some("web-1")),
            format!("[{}]: connection error", ConnectionState::Errored.display_name())
        );
    }

    #[test]
    fn label_only_when_connected() {
        let status = ConnectionStatus::new(ConnectionState::Connected);
        assert_eq!(
            format_status(&status, Some("web-1")),
            format!("[{}] web-1", ConnectionState::Connected.display_name())
        );
    }

    #[test]
    fn presentation_line() {
        let p = Presentation {
            fullscreen: true,
            keyboard_visible: false,
        };
        assert_eq!(format_presentation(&p), "fullscreen on, keyboard hidden");
    }
}
