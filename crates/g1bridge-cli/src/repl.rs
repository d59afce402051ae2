//! REPL – operator shell for a connected bridge.
//!
//! Supported slash-commands:
//!   /help              – show this list
//!   /status            – latest poller snapshot
//!   /fsm               – query the FSM id now
//!   /mappings          – joystick mapping table, in priority order
//!   /gestures          – gesture catalogue
//!   /actions           – the firmware's action list
//!   /gesture <name>    – run an arm gesture
//!   /joy <json frame>  – publish a `/joy` message on the inbound topic
//!   /stop              – emergency stop
//!   /quit | /exit      – disconnect and exit

use colored::Colorize;
use std::io::{self, BufRead, Write};

use g1bridge_hal::gesture_names;
use g1bridge_kernel::{JOY_TOPIC, RobotBridge};
use g1bridge_middleware::{EventBus, Topic};
use g1bridge_types::{BridgeError, Event, EventPayload, Message};
use serde_json::Value;

const SOURCE: &str = "g1bridge-cli::repl";

/// One parsed REPL line.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Help,
    Status,
    Fsm,
    Mappings,
    Gestures,
    Actions,
    Gesture(String),
    Joy(Value),
    Stop,
    Quit,
    Unknown(String),
}

/// Parse one trimmed, non-empty line.
pub fn parse_command(line: &str) -> Result<Command, BridgeError> {
    let (head, rest) = match line.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (line, ""),
    };

    let cmd = match head {
        "/help" => Command::Help,
        "/status" => Command::Status,
        "/fsm" => Command::Fsm,
        "/mappings" => Command::Mappings,
        "/gestures" => Command::Gestures,
        "/actions" => Command::Actions,
        "/gesture" => {
            if rest.is_empty() {
                return Err(BridgeError::MalformedInput("usage: /gesture <name>".to_string()));
            }
            Command::Gesture(rest.to_string())
        }
        "/joy" => {
            let value: Value = serde_json::from_str(rest)
                .map_err(|e| BridgeError::MalformedInput(format!("joy frame is not JSON: {e}")))?;
            if !value.is_object() {
                return Err(BridgeError::MalformedInput(
                    "joy frame must be an object with `axes` and/or `buttons`".to_string(),
                ));
            }
            Command::Joy(value)
        }
        "/stop" => Command::Stop,
        "/quit" | "/exit" => Command::Quit,
        other => Command::Unknown(other.to_string()),
    };
    Ok(cmd)
}

/// Entry point for the interactive REPL.  Returns on `/quit` or EOF; the
/// caller disconnects the bridge afterwards.
pub fn run(bridge: &RobotBridge, bus: &EventBus) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("{} ", "g1>".bold().cyan());
        stdout.flush().ok();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break, // EOF
            Ok(_) => {}
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        }

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let cmd = match parse_command(line) {
            Ok(cmd) => cmd,
            Err(e) => {
                println!("{} {}", "✗".red().bold(), e);
                continue;
            }
        };

        match cmd {
            Command::Help => cmd_help(),
            Command::Status => cmd_status(bridge),
            Command::Fsm => report(bridge.fsm_status().map(|id| format!("fsm_id {id}"))),
            Command::Mappings => cmd_mappings(bridge),
            Command::Gestures => cmd_gestures(),
            Command::Actions => cmd_actions(bridge),
            Command::Gesture(name) => report(
                bridge
                    .gesture(&name)
                    .map(|id| format!("gesture '{name}' executed (action {id})")),
            ),
            Command::Joy(value) => cmd_joy(bus, value),
            Command::Stop => report(bridge.emergency_stop("operator /stop").map(|()| "motion stopped".to_string())),
            Command::Quit => {
                println!("{}", "Goodbye.".green());
                break;
            }
            Command::Unknown(other) => {
                println!(
                    "{} '{}'. Type {} for available commands.",
                    "Unknown command:".red(),
                    other.yellow(),
                    "/help".bold()
                );
            }
        }
    }
}

fn report(result: Result<String, BridgeError>) {
    match result {
        Ok(msg) => println!("  {} {}", "✓".green().bold(), msg),
        Err(e) => {
            println!("  {} {}", "✗".red().bold(), e);
            if let BridgeError::NativeFault { category, .. } | BridgeError::InitializationFailed { category, .. } = &e {
                println!("    {}", category.hint().dimmed());
            }
        }
    }
}

fn cmd_help() {
    println!();
    println!("  {}", "Available commands:".bold());
    let rows = [
        ("/help", "Show this help message"),
        ("/status", "Latest status snapshot from the poller"),
        ("/fsm", "Query the locomotion FSM id now"),
        ("/mappings", "Joystick mapping table (first match wins)"),
        ("/gestures", "Known arm gesture names"),
        ("/actions", "Action list reported by the arm firmware"),
        ("/gesture <name>", "Run an arm gesture"),
        ("/joy <json>", "Send a joystick frame, e.g. {\"buttons\":[0,0,0,1]}"),
        ("/stop", "Emergency stop"),
        ("/quit", "Disconnect and exit"),
    ];
    for (cmd, help) in rows {
        println!("    {:<18} {}", cmd.cyan(), help);
    }
    println!();
}

fn cmd_status(bridge: &RobotBridge) {
    let status = bridge.status();
    println!();
    println!("  {}", "Robot status".bold());
    println!("    {:<12} {}", "robot", status.identity.id);
    println!("    {:<12} {}", "model", status.identity.model);
    println!("    {:<12} {}", "state", status.motion_state.to_string().bold());
    println!("    {:<12} ({:.2}, {:.2}, {:.2})", "pose", status.pose.x, status.pose.y, status.pose.th);
    println!("    {:<12} {}", "updated", status.updated_at.to_rfc3339());
    println!(
        "    {:<12} {}",
        "arm",
        if bridge.has_arm() { "available".green() } else { "unavailable".yellow() }
    );
    println!();
}

fn cmd_mappings(bridge: &RobotBridge) {
    println!();
    for (i, line) in bridge.dispatcher().describe_mappings().iter().enumerate() {
        println!("    {:>2}. {}", i + 1, line);
    }
    println!();
}

fn cmd_gestures() {
    println!();
    for name in gesture_names() {
        println!("    • {}", name);
    }
    println!();
}

fn cmd_actions(bridge: &RobotBridge) {
    match bridge.list_actions() {
        Ok(list) if list.is_empty() => println!("  {}", "(firmware reported no actions)".dimmed()),
        Ok(list) => println!("  {}", list),
        Err(e) => report(Err(e)),
    }
}

fn cmd_joy(bus: &EventBus, value: Value) {
    let message = Message {
        topic: JOY_TOPIC.to_string(),
        value,
        target: None,
    };
    let sent = bus
        .publish_to(Topic::Inbound, Event::new(SOURCE, EventPayload::Message(message)))
        .map(|_| "joy frame queued for dispatch".to_string());
    report(sent);
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn plain_commands_parse() {
        assert_eq!(parse_command("/help").unwrap(), Command::Help);
        assert_eq!(parse_command("/status").unwrap(), Command::Status);
        assert_eq!(parse_command("/exit").unwrap(), Command::Quit);
        assert_eq!(parse_command("/stop").unwrap(), Command::Stop);
    }

    #[test]
    fn gesture_takes_a_name() {
        assert_eq!(
            parse_command("/gesture  high five ").unwrap(),
            Command::Gesture("high five".to_string())
        );
        assert!(matches!(parse_command("/gesture"), Err(BridgeError::MalformedInput(_))));
    }

    #[test]
    fn joy_requires_a_json_object() {
        assert_eq!(
            parse_command(r#"/joy {"axes": [0.0, 1.0]}"#).unwrap(),
            Command::Joy(json!({"axes": [0.0, 1.0]}))
        );
        assert!(matches!(parse_command("/joy [1, 2]"), Err(BridgeError::MalformedInput(_))));
        assert!(matches!(parse_command("/joy {oops"), Err(BridgeError::MalformedInput(_))));
        assert!(matches!(parse_command("/joy"), Err(BridgeError::MalformedInput(_))));
    }

    #[test]
    fn unknown_command_is_reported_not_rejected() {
        assert_eq!(parse_command("/dance").unwrap(), Command::Unknown("/dance".to_string()));
    }

    #[test]
    fn joy_frame_reaches_inbound_topic() {
        let bus = EventBus::default();
        let mut inbound = bus.subscribe_to(Topic::Inbound);
        cmd_joy(&bus, json!({"buttons": [0, 0, 0, 1]}));

        let event = inbound.try_recv().expect("inbound event");
        match event.payload {
            EventPayload::Message(m) => {
                assert_eq!(m.topic, JOY_TOPIC);
                assert_eq!(m.value, json!({"buttons": [0, 0, 0, 1]}));
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }
}
