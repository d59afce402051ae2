//! Configuration Vault – reads/writes `~/.g1bridge/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use g1bridge_kernel::{BridgeSettings, MotionDefaults, PollerConfig};
use g1bridge_types::RobotIdentity;
use serde::{Deserialize, Serialize};

/// `[robot]` table: static identity reported in every status snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotSection {
    #[serde(default = "default_robot_id")]
    pub id: String,
    #[serde(default = "default_robot_id")]
    pub model: String,
    #[serde(default = "default_category")]
    pub category: String,
}

impl Default for RobotSection {
    fn default() -> Self {
        Self {
            id: default_robot_id(),
            model: default_robot_id(),
            category: default_category(),
        }
    }
}

/// Persisted bridge configuration stored in `~/.g1bridge/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Network interface the SDK binds to.
    #[serde(default = "default_interface")]
    pub network_interface: String,

    /// Joystick walking speed, m/s.
    #[serde(default = "default_linear_velocity")]
    pub linear_velocity: f32,

    /// Joystick turning speed, rad/s.
    #[serde(default = "default_angular_velocity")]
    pub angular_velocity: f32,

    #[serde(default = "default_loco_timeout")]
    pub loco_timeout_secs: f32,

    #[serde(default = "default_arm_timeout")]
    pub arm_timeout_secs: f32,

    /// Try to bring up the arm gesture service.
    #[serde(default = "default_true")]
    pub enable_arm: bool,

    #[serde(default = "default_poll_period")]
    pub poll_period_ms: u64,

    /// Poll period after a poller fault.
    #[serde(default = "default_degraded_poll_period")]
    pub degraded_poll_period_ms: u64,

    // Tables serialise after plain keys.
    #[serde(default)]
    pub robot: RobotSection,
}

fn default_robot_id() -> String {
    "unitree_g1".to_string()
}
fn default_category() -> String {
    "sample".to_string()
}
fn default_interface() -> String {
    "eth0".to_string()
}
fn default_linear_velocity() -> f32 {
    0.3
}
fn default_angular_velocity() -> f32 {
    0.5
}
fn default_loco_timeout() -> f32 {
    3.0
}
fn default_arm_timeout() -> f32 {
    10.0
}
fn default_true() -> bool {
    true
}
fn default_poll_period() -> u64 {
    100
}
fn default_degraded_poll_period() -> u64 {
    1000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network_interface: default_interface(),
            linear_velocity: default_linear_velocity(),
            angular_velocity: default_angular_velocity(),
            loco_timeout_secs: default_loco_timeout(),
            arm_timeout_secs: default_arm_timeout(),
            enable_arm: default_true(),
            poll_period_ms: default_poll_period(),
            degraded_poll_period_ms: default_degraded_poll_period(),
            robot: RobotSection::default(),
        }
    }
}

fn seconds(value: f32, fallback: f32) -> Duration {
    let valid = |secs: f32| Duration::try_from_secs_f32(secs).ok().filter(|d| !d.is_zero());
    valid(value).or_else(|| valid(fallback)).unwrap_or_default()
}

impl Config {
    /// Translate into the kernel's settings.  Zero, negative or non-finite
    /// timeouts fall back to their defaults.
    pub fn to_settings(&self) -> BridgeSettings {
        BridgeSettings {
            identity: RobotIdentity {
                id: self.robot.id.clone(),
                model: self.robot.model.clone(),
                category: self.robot.category.clone(),
            },
            interface: self.network_interface.clone(),
            loco_timeout: seconds(self.loco_timeout_secs, default_loco_timeout()),
            arm_timeout: seconds(self.arm_timeout_secs, default_arm_timeout()),
            enable_arm: self.enable_arm,
            motion: MotionDefaults {
                linear: self.linear_velocity,
                angular: self.angular_velocity,
            },
            poller: PollerConfig {
                period: Duration::from_millis(self.poll_period_ms.max(1)),
                degraded_period: Duration::from_millis(self.degraded_poll_period_ms.max(1)),
            },
        }
    }
}

/// Return the path to `~/.g1bridge/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".g1bridge").join("config.toml")
}

/// Load the config, writing defaults first when the file is missing.
/// The flag is `true` when the file was just created.
pub fn load_or_init() -> Result<(Config, bool), String> {
    load_or_init_at(&config_path())
}

pub(crate) fn load_or_init_at(path: &Path) -> Result<(Config, bool), String> {
    match load_from(path)? {
        Some(cfg) => Ok((cfg, false)),
        None => {
            let mut cfg = Config::default();
            save_to(&cfg, path)?;
            apply_env_overrides(&mut cfg);
            Ok((cfg, true))
        }
    }
}

/// Load the config from a specific path.  `None` if the file does not exist.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    let mut cfg = read_from(path)?;
    if let Some(cfg) = cfg.as_mut() {
        apply_env_overrides(cfg);
    }
    Ok(cfg)
}

/// Parse the file as written, without environment overrides.
fn read_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    toml::from_str(&raw)
        .map(Some)
        .map_err(|e| format!("Failed to parse config: {}", e))
}

/// Apply `G1BRIDGE_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `G1BRIDGE_INTERFACE` | `network_interface` |
/// | `G1BRIDGE_ROBOT_ID` | `robot.id` |
/// | `G1BRIDGE_LINEAR_VELOCITY` | `linear_velocity` |
/// | `G1BRIDGE_ANGULAR_VELOCITY` | `angular_velocity` |
/// | `G1BRIDGE_ENABLE_ARM` | `enable_arm` |
///
/// Values that do not parse are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("G1BRIDGE_INTERFACE") {
        cfg.network_interface = v;
    }
    if let Ok(v) = std::env::var("G1BRIDGE_ROBOT_ID") {
        cfg.robot.id = v;
    }
    if let Ok(v) = std::env::var("G1BRIDGE_LINEAR_VELOCITY")
        && let Ok(speed) = v.parse::<f32>()
    {
        cfg.linear_velocity = speed;
    }
    if let Ok(v) = std::env::var("G1BRIDGE_ANGULAR_VELOCITY")
        && let Ok(speed) = v.parse::<f32>()
    {
        cfg.angular_velocity = speed;
    }
    if let Ok(v) = std::env::var("G1BRIDGE_ENABLE_ARM") {
        match v.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => cfg.enable_arm = true,
            "0" | "false" | "no" => cfg.enable_arm = false,
            _ => {}
        }
    }
}

/// Save the config to a specific path, creating the directory if needed.
pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| format!("Failed to create config directory: {}", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw = toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw).map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");

        let file_mode = std::fs::metadata(&path).expect("file metadata").permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600, "config file must have 0o600 permissions");

        let dir_mode = std::fs::metadata(path.parent().unwrap())
            .expect("dir metadata")
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(dir_mode, 0o700, "config directory must have 0o700 permissions");
    }

    #[test]
    fn missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        let (cfg, created) = load_or_init_at(&path).expect("init");
        assert!(created);
        assert!(path.exists());
        assert_eq!(cfg.robot.category, "sample");

        let (_, created) = load_or_init_at(&path).expect("reload");
        assert!(!created);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "linear_velocity = 0.6\n\n[robot]\nid = \"g1-lab\"\n").unwrap();

        let cfg = read_from(&path).expect("read").expect("some");
        assert!((cfg.linear_velocity - 0.6).abs() < f32::EPSILON);
        assert_eq!(cfg.angular_velocity, 0.5);
        assert_eq!(cfg.robot.id, "g1-lab");
        assert_eq!(cfg.robot.model, "unitree_g1");
        assert_eq!(cfg.network_interface, "eth0");
        assert!(cfg.enable_arm);
    }

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        save_to(&Config::default(), &path).expect("save");
        let loaded = read_from(&path).expect("read ok").expect("some");
        assert_eq!(loaded.poll_period_ms, 100);
        assert_eq!(loaded.degraded_poll_period_ms, 1000);
        assert_eq!(loaded.robot, RobotSection::default());
    }

    #[test]
    fn settings_carry_timeouts_and_speeds() {
        let settings = Config::default().to_settings();
        assert_eq!(settings.loco_timeout, Duration::from_secs(3));
        assert_eq!(settings.arm_timeout, Duration::from_secs(10));
        assert_eq!(settings.poller.period, Duration::from_millis(100));
        assert_eq!(settings.motion, MotionDefaults::default());
        assert_eq!(settings.identity, RobotIdentity::default());
    }

    #[test]
    fn invalid_timeout_falls_back() {
        let cfg = Config {
            loco_timeout_secs: -1.0,
            arm_timeout_secs: f32::NAN,
            ..Config::default()
        };
        let settings = cfg.to_settings();
        assert_eq!(settings.loco_timeout, Duration::from_secs(3));
        assert_eq!(settings.arm_timeout, Duration::from_secs(10));
    }

    #[test]
    fn zero_timeout_falls_back() {
        let cfg = Config {
            loco_timeout_secs: 0.0,
            arm_timeout_secs: 1e-12,
            ..Config::default()
        };
        let settings = cfg.to_settings();
        assert_eq!(settings.loco_timeout, Duration::from_secs(3));
        assert_eq!(settings.arm_timeout, Duration::from_secs(10));
    }

    #[test]
    fn config_path_points_to_g1bridge_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".g1bridge"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    // Env-var tests share process state; each one uses its own variable and
    // no other test asserts on an overridable field after `load_from`.

    #[test]
    fn apply_env_overrides_changes_interface() {
        // SAFETY: no other test touches this variable.
        unsafe { std::env::set_var("G1BRIDGE_INTERFACE", "enp3s0") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.network_interface, "enp3s0");
        unsafe { std::env::remove_var("G1BRIDGE_INTERFACE") };
    }

    #[test]
    fn apply_env_overrides_changes_robot_id() {
        unsafe { std::env::set_var("G1BRIDGE_ROBOT_ID", "g1-07") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.robot.id, "g1-07");
        unsafe { std::env::remove_var("G1BRIDGE_ROBOT_ID") };
    }

    #[test]
    fn apply_env_overrides_ignores_invalid_speed() {
        unsafe { std::env::set_var("G1BRIDGE_LINEAR_VELOCITY", "fast") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.linear_velocity, 0.3);
        unsafe { std::env::remove_var("G1BRIDGE_LINEAR_VELOCITY") };
    }

    #[test]
    fn apply_env_overrides_changes_angular_speed() {
        unsafe { std::env::set_var("G1BRIDGE_ANGULAR_VELOCITY", "0.8") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert!((cfg.angular_velocity - 0.8).abs() < f32::EPSILON);
        unsafe { std::env::remove_var("G1BRIDGE_ANGULAR_VELOCITY") };
    }

    #[test]
    fn apply_env_overrides_disables_arm() {
        unsafe { std::env::set_var("G1BRIDGE_ENABLE_ARM", "false") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert!(!cfg.enable_arm);
        unsafe { std::env::remove_var("G1BRIDGE_ENABLE_ARM") };
    }
}
