use std::collections::HashMap;
use std::net::{SocketAddr, ToSocketAddrs};

use crate::config::{ActionSpec, Config};
use crate::error::ConfigError;

/// Placeholder replaced by the decimal match number at dispatch time.
pub const MATCH_NUM_PLACEHOLDER: &str = "{match_num}";

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

/// A fully compiled command: device resolved to a transport address, so
/// dispatch never performs a lookup and cannot fail on an unknown device.
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub device: String,
    pub target: SocketAddr,
    pub message: String,
    pub args: Vec<String>,
    pub description: String,
}

impl Action {
    /// The message with `{match_num}` substituted.
    pub fn message_for(&self, match_number: u32) -> String {
        substitute(&self.message, match_number)
    }

    /// The args with `{match_num}` substituted in each.
    pub fn args_for(&self, match_number: u32) -> Vec<String> {
        self.args
            .iter()
            .map(|a| substitute(a, match_number))
            .collect()
    }
}

fn substitute(template: &str, match_number: u32) -> String {
    template.replace(MATCH_NUM_PLACEHOLDER, &match_number.to_string())
}

/// A compiled action with its fire offset, in seconds relative to match start
/// (negative fires before the start).
#[derive(Debug, Clone, PartialEq)]
pub struct TimedAction {
    pub offset_secs: f64,
    pub action: Action,
}

// ---------------------------------------------------------------------------
// ActionSet
// ---------------------------------------------------------------------------

/// Immutable, validated action collection.
///
/// `timed` is sorted by offset; entries with equal offsets keep their config
/// order, which fixes the dispatch order for simultaneous fire times.
#[derive(Debug, Clone)]
pub struct ActionSet {
    pub timed: Vec<TimedAction>,
    pub abort: Vec<Action>,
}

impl ActionSet {
    /// Compile and validate the configured actions.
    ///
    /// Every rule here is a load-time [`ConfigError`]: unknown or
    /// unresolvable devices, a normal action without an offset, an abort
    /// action with one, and offsets outside `[-pre, match + post]`.
    pub fn compile(config: &Config) -> Result<Self, ConfigError> {
        let devices = resolve_devices(&config.devices)?;

        let min = -config.slot.pre;
        let max = config.slot.match_len + config.slot.post;

        let mut timed = Vec::with_capacity(config.actions.len());
        for spec in &config.actions {
            let offset = spec.offset.ok_or_else(|| ConfigError::MissingOffset {
                description: spec.description.clone(),
            })?;
            if offset < min || offset > max {
                return Err(ConfigError::OffsetOutOfRange {
                    description: spec.description.clone(),
                    offset,
                    min,
                    max,
                });
            }
            timed.push(TimedAction {
                offset_secs: offset,
                action: compile_action(spec, &devices)?,
            });
        }
        timed.sort_by(|a, b| a.offset_secs.total_cmp(&b.offset_secs));

        let mut abort = Vec::with_capacity(config.abort_actions.len());
        for spec in &config.abort_actions {
            if spec.offset.is_some() {
                return Err(ConfigError::UnexpectedOffset {
                    description: spec.description.clone(),
                });
            }
            abort.push(compile_action(spec, &devices)?);
        }

        Ok(Self { timed, abort })
    }

    /// Offset of the last normal action, if any.
    pub fn last_offset(&self) -> Option<f64> {
        self.timed.last().map(|t| t.offset_secs)
    }
}

fn compile_action(
    spec: &ActionSpec,
    devices: &HashMap<String, SocketAddr>,
) -> Result<Action, ConfigError> {
    let target = *devices
        .get(&spec.device)
        .ok_or_else(|| ConfigError::UnknownDevice {
            device: spec.device.clone(),
            description: spec.description.clone(),
        })?;
    Ok(Action {
        device: spec.device.clone(),
        target,
        message: spec.message.clone(),
        args: spec.args.clone(),
        description: spec.description.clone(),
    })
}

fn resolve_devices(
    devices: &HashMap<String, String>,
) -> Result<HashMap<String, SocketAddr>, ConfigError> {
    let mut resolved = HashMap::with_capacity(devices.len());
    for (name, address) in devices {
        let addr = address
            .to_socket_addrs()
            .ok()
            .and_then(|mut addrs| addrs.next())
            .ok_or_else(|| ConfigError::BadAddress {
                device: name.clone(),
                address: address.clone(),
            })?;
        resolved.insert(name.clone(), addr);
    }
    Ok(resolved)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
