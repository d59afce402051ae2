//! `g1bridge` – command bridge for the Unitree G1.
//!
//! 1. Loads `~/.g1bridge/config.toml`, writing defaults on first run.
//! 2. Connects the locomotion and (optionally) arm domains and starts the
//!    status poller.
//! 3. Runs the message router on the inbound bus topic.
//! 4. Intercepts **Ctrl-C** to stop all motion, publish an `EmergencyStop`
//!    alert and release the native handles.
//! 5. Drops the operator into an interactive REPL.

mod config;
mod repl;

use colored::Colorize;
use std::sync::Arc;
use tracing::{error, warn};

use g1bridge_hal::{ArmNative, LocoNative};
use g1bridge_kernel::{MessageRouter, RobotBridge};
use g1bridge_middleware::{EventBus, Topic};

fn main() {
    // RUST_LOG picks the filter (default "info"); G1BRIDGE_LOG_FORMAT=json
    // switches to newline-delimited JSON.
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    if std::env::var("G1BRIDGE_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .compact()
            .init();
    }

    print_banner();

    // ── Configuration ─────────────────────────────────────────────────────
    let cfg = match config::load_or_init() {
        Ok((cfg, created)) => {
            let verb = if created { "Default config written to" } else { "Config loaded from" };
            println!("  {} {}", verb, config::config_path().display().to_string().bold());
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
    };

    // ── Bridge ────────────────────────────────────────────────────────────
    let bus = EventBus::default();
    let (loco_driver, arm_driver) = drivers();

    print!("\n  Connecting on {} … ", cfg.network_interface.dimmed());
    let bridge = match RobotBridge::connect_with_bus(cfg.to_settings(), loco_driver, arm_driver, &bus) {
        Ok(bridge) => {
            println!("{}", "online".green());
            if !bridge.has_arm() {
                println!("  {}", "Arm gestures unavailable; locomotion only.".yellow());
            }
            Arc::new(bridge)
        }
        Err(e) => {
            println!("{}", "failed".red());
            error!(error = %e, "bridge connection failed");
            println!("  {}", e);
            if let g1bridge_types::BridgeError::InitializationFailed { category, .. } = &e {
                println!("  {}", category.hint().dimmed());
            }
            std::process::exit(1);
        }
    };

    let router = MessageRouter::new(bridge.dispatcher(), bus.publisher(Topic::Outbound));
    if let Err(e) = router.spawn(bus.subscribe_to(Topic::Inbound)) {
        warn!(error = %e, "failed to start message router; /joy frames will not be dispatched");
    }

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    {
        let bridge = bridge.clone();
        if let Err(e) = ctrlc::set_handler(move || {
            println!();
            println!("{}", "⚠  Ctrl-C received – stopping the robot …".yellow().bold());
            match bridge.emergency_stop("operator Ctrl-C") {
                Ok(()) => println!("{}", "  ✓ Motion stopped, EmergencyStop published.".green()),
                Err(e) => println!("  {} {}", "✗ stop_move failed:".red(), e),
            }
            bridge.disconnect();
            println!("{}", "  ✓ Handles released. Exiting.".green());
            std::process::exit(130);
        }) {
            warn!(error = %e, "Failed to install Ctrl-C handler; Ctrl-C will not stop the robot");
        }
    }

    println!();
    println!("  Type {} for a list of commands.\n", "/help".bold().cyan());

    repl::run(&bridge, &bus);
    bridge.disconnect();
}

#[cfg(feature = "native")]
fn drivers() -> (Arc<dyn LocoNative>, Option<Arc<dyn ArmNative>>) {
    use g1bridge_hal::ffi::{NativeArm, NativeLoco};
    let loco: Arc<dyn LocoNative> = Arc::new(NativeLoco);
    let arm: Arc<dyn ArmNative> = Arc::new(NativeArm);
    (loco, Some(arm))
}

#[cfg(not(feature = "native"))]
fn drivers() -> (Arc<dyn LocoNative>, Option<Arc<dyn ArmNative>>) {
    use g1bridge_hal::sim::{SimArm, SimLoco};
    warn!("built without the `native` feature; driving the in-memory simulator");
    let loco: Arc<dyn LocoNative> = Arc::new(SimLoco::new());
    let arm: Arc<dyn ArmNative> = Arc::new(SimArm::new());
    (loco, Some(arm))
}

fn print_banner() {
    println!();
    println!("{}", r#"   ___ _   _        _    _          "#.bold().cyan());
    println!("{}", r#"  / __/ | | |__ _ _(_)__| |__ _ ___ "#.bold().cyan());
    println!("{}", r#" | (_ | | | '_ \ '_| / _` / _` / -_)"#.bold().cyan());
    println!("{}", r#"  \___|_| |_.__/_| |_\__,_\__, \___|"#.bold().cyan());
    println!("{}", r#"                          |___/     "#.bold().cyan());
    println!();
    println!("  {} {}", "g1bridge".bold(), format!("v{}", env!("CARGO_PKG_VERSION")).dimmed());
    println!("  Command bridge for the Unitree G1");
    println!();
}
