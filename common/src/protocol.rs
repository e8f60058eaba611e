//! Line protocol profiles for the serial link.
//!
//! Two deployed layouts share the same control logic and differ only in framing:
//!
//! ```text
//! chain  status  ESP002#Tang 2#26.8#80.0#1#0#0#1     id#name#temp#hum#fog#fan#heater#led
//!        command fan2#1                              <stem><floor>#<int>
//! bridge status  F2:26.8:80.0:1:0:0:1                F<floor>:temp:hum:led:fan:heater:fog
//!        command C2:1:x:0:1                          C<floor>:led:fan:heater:fog
//! ```

use log::info;
use thiserror::Error;

use crate::{
    config::{NodeConfig, ProtocolVariant},
    types::{Actuator, CommandMessage, StatusMessage},
};

pub const CHAIN_SEPARATOR: char = '#';
pub const BRIDGE_SEPARATOR: char = ':';

/// Bridge lines this short are link-layer noise, not commands.
const BRIDGE_MIN_LINE_LEN: usize = 4;

/// Reasons a received line is discarded. Never reported on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LineRejected {
    #[error("echo of a node status line")]
    Echo,
    #[error("line longer than {max} bytes")]
    TooLong { max: usize },
    #[error("line shorter than {min} bytes")]
    TooShort { min: usize },
    #[error("missing `{0}` separator")]
    MissingSeparator(char),
    #[error("empty device key")]
    EmptyKey,
    #[error("unknown device key `{0}`")]
    UnknownKey(String),
    #[error("command addressed to another floor")]
    WrongFloor,
    #[error("no applicable fields")]
    NoFields,
    #[error("expected {expected} fields, found {found}")]
    Arity { expected: usize, found: usize },
    #[error("malformed `{0}` field")]
    BadField(&'static str),
}

/// Splits a line on one separator character.
#[derive(Debug, Clone, Copy)]
pub struct Tokenizer {
    separator: char,
}

impl Tokenizer {
    pub const fn new(separator: char) -> Self {
        Self { separator }
    }

    /// Key before the first separator, value after it. The value may contain more separators.
    pub fn key_value<'a>(&self, line: &'a str) -> Result<(&'a str, &'a str), LineRejected> {
        let (key, value) = line
            .split_once(self.separator)
            .ok_or(LineRejected::MissingSeparator(self.separator))?;
        if key.is_empty() {
            return Err(LineRejected::EmptyKey);
        }
        Ok((key, value))
    }

    /// Exactly `N` leading fields; missing fields reject, extra trailing fields are ignored.
    pub fn fixed<'a, const N: usize>(&self, line: &'a str) -> Result<[&'a str; N], LineRejected> {
        let mut fields = [""; N];
        let mut parts = line.split(self.separator);
        for (found, slot) in fields.iter_mut().enumerate() {
            *slot = parts.next().ok_or(LineRejected::Arity { expected: N, found })?;
        }
        Ok(fields)
    }

    /// Up to `N` leading fields; missing fields are `None`, extra trailing fields are ignored.
    pub fn record<'a, const N: usize>(&self, line: &'a str) -> [Option<&'a str>; N] {
        let mut fields = [None; N];
        for (slot, part) in fields.iter_mut().zip(line.split(self.separator)) {
            *slot = Some(part);
        }
        fields
    }
}

pub trait ProtocolProfile: Send + std::fmt::Debug {
    fn variant(&self) -> ProtocolVariant;

    /// True for status lines from this or a peer node seen on a shared line.
    fn is_echo(&self, line: &str) -> bool;

    /// One status line, without terminator.
    fn encode_status(&self, status: &StatusMessage) -> String;

    fn decode_command(&self, line: &str) -> Result<Vec<CommandMessage>, LineRejected>;

    /// Peer-side parse of a status line, as the coordinator reads it.
    fn decode_status(&self, line: &str) -> Result<StatusMessage, LineRejected>;
}

/// One outgoing line with its terminator, ready for a single link write.
pub fn frame_line(line: &str) -> Vec<u8> {
    let mut frame = Vec::with_capacity(line.len() + 1);
    frame.extend_from_slice(line.as_bytes());
    frame.push(b'\n');
    frame
}

pub fn build_profile(config: &NodeConfig) -> Box<dyn ProtocolProfile> {
    match config.variant {
        ProtocolVariant::Chain => Box::new(ChainProfile::new(config)),
        ProtocolVariant::Bridge => Box::new(BridgeProfile::new(config)),
    }
}

fn bit(on: bool) -> char {
    if on {
        '1'
    } else {
        '0'
    }
}

fn parse_bit(field: &str, name: &'static str) -> Result<bool, LineRejected> {
    match field {
        "1" => Ok(true),
        "0" => Ok(false),
        _ => Err(LineRejected::BadField(name)),
    }
}

fn parse_reading(field: &str, name: &'static str) -> Result<f32, LineRejected> {
    field
        .trim()
        .parse::<f32>()
        .map_err(|_| LineRejected::BadField(name))
}

/// Leading decimal integer with optional sign; anything unparsable reads as zero.
fn leading_int(field: &str) -> i64 {
    let trimmed = field.trim_start();
    let (negative, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };

    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    let value = digits[..end]
        .chars()
        .fold(0_i64, |acc, c| {
            acc.saturating_mul(10)
                .saturating_add(i64::from(c as u8 - b'0'))
        });

    if negative {
        -value
    } else {
        value
    }
}

fn trailing_floor(id: &str) -> u8 {
    let start = id
        .rfind(|c: char| !c.is_ascii_digit())
        .map(|idx| idx + 1)
        .unwrap_or(0);
    id[start..].parse().unwrap_or(0)
}

#[derive(Debug, Clone)]
pub struct ChainProfile {
    max_command_len: usize,
    echo_prefixes: Vec<String>,
    keys: [(String, Actuator); 4],
}

impl ChainProfile {
    const TOKENS: Tokenizer = Tokenizer::new(CHAIN_SEPARATOR);

    pub fn new(config: &NodeConfig) -> Self {
        let floor = config.identity.floor;
        let mut echo_prefixes = config.echo_prefixes.clone();
        if !echo_prefixes.contains(&config.identity.id) {
            echo_prefixes.push(config.identity.id.clone());
        }

        Self {
            max_command_len: config.max_command_len,
            echo_prefixes,
            keys: Actuator::ALL
                .map(|actuator| (format!("{}{floor}", actuator.key_stem()), actuator)),
        }
    }

    fn actuator_for(&self, key: &str) -> Option<Actuator> {
        self.keys
            .iter()
            .find(|(known, _)| known == key)
            .map(|(_, actuator)| *actuator)
    }
}

impl ProtocolProfile for ChainProfile {
    fn variant(&self) -> ProtocolVariant {
        ProtocolVariant::Chain
    }

    fn is_echo(&self, line: &str) -> bool {
        self.echo_prefixes
            .iter()
            .any(|prefix| line.starts_with(prefix.as_str()))
    }

    fn encode_status(&self, status: &StatusMessage) -> String {
        let sep = CHAIN_SEPARATOR;
        format!(
            "{}{sep}{}{sep}{:.1}{sep}{:.1}{sep}{}{sep}{}{sep}{}{sep}{}",
            status.id,
            status.name,
            status.temperature_c,
            status.humidity_pct,
            bit(status.fog),
            bit(status.fan),
            bit(status.heater),
            bit(status.indicator),
        )
    }

    fn decode_command(&self, line: &str) -> Result<Vec<CommandMessage>, LineRejected> {
        let line = line.trim();
        if self.is_echo(line) {
            return Err(LineRejected::Echo);
        }
        if line.len() > self.max_command_len {
            return Err(LineRejected::TooLong {
                max: self.max_command_len,
            });
        }

        let (key, value) = Self::TOKENS.key_value(line)?;
        let target = self
            .actuator_for(key)
            .ok_or_else(|| LineRejected::UnknownKey(key.to_string()))?;
        let value = leading_int(value);
        info!("[RX-CMD] {key} = {value}");

        Ok(vec![CommandMessage {
            target,
            value: value != 0,
        }])
    }

    fn decode_status(&self, line: &str) -> Result<StatusMessage, LineRejected> {
        let [id, name, temp, humidity, fog, fan, heater, indicator] =
            Self::TOKENS.fixed::<8>(line.trim())?;

        Ok(StatusMessage {
            id: id.to_string(),
            name: name.to_string(),
            floor: trailing_floor(id),
            temperature_c: parse_reading(temp, "temperature")?,
            humidity_pct: parse_reading(humidity, "humidity")?,
            fog: parse_bit(fog, "fog")?,
            fan: parse_bit(fan, "fan")?,
            heater: parse_bit(heater, "heater")?,
            indicator: parse_bit(indicator, "indicator")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct BridgeProfile {
    max_command_len: usize,
    command_prefix: String,
}

impl BridgeProfile {
    const TOKENS: Tokenizer = Tokenizer::new(BRIDGE_SEPARATOR);
    /// Command field order after the floor prefix.
    const COMMAND_FIELDS: [Actuator; 4] = [
        Actuator::Indicator,
        Actuator::Fan,
        Actuator::Heater,
        Actuator::Fog,
    ];

    pub fn new(config: &NodeConfig) -> Self {
        Self {
            max_command_len: config.max_command_len,
            command_prefix: format!("C{}", config.identity.floor),
        }
    }
}

impl ProtocolProfile for BridgeProfile {
    fn variant(&self) -> ProtocolVariant {
        ProtocolVariant::Bridge
    }

    fn is_echo(&self, line: &str) -> bool {
        let Some(rest) = line.strip_prefix('F') else {
            return false;
        };
        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        digits > 0 && rest[digits..].starts_with(BRIDGE_SEPARATOR)
    }

    fn encode_status(&self, status: &StatusMessage) -> String {
        let sep = BRIDGE_SEPARATOR;
        format!(
            "F{}{sep}{:.1}{sep}{:.1}{sep}{}{sep}{}{sep}{}{sep}{}",
            status.floor,
            status.temperature_c,
            status.humidity_pct,
            bit(status.indicator),
            bit(status.fan),
            bit(status.heater),
            bit(status.fog),
        )
    }

    fn decode_command(&self, line: &str) -> Result<Vec<CommandMessage>, LineRejected> {
        let line = line.trim();
        if line.len() < BRIDGE_MIN_LINE_LEN {
            return Err(LineRejected::TooShort {
                min: BRIDGE_MIN_LINE_LEN,
            });
        }
        if self.is_echo(line) {
            return Err(LineRejected::Echo);
        }
        if line.len() > self.max_command_len {
            return Err(LineRejected::TooLong {
                max: self.max_command_len,
            });
        }

        let [prefix, fields @ ..] = Self::TOKENS.record::<5>(line);
        match prefix {
            Some(prefix) if prefix == self.command_prefix => {}
            Some(prefix) if prefix.starts_with('C') => return Err(LineRejected::WrongFloor),
            Some(prefix) => return Err(LineRejected::UnknownKey(prefix.to_string())),
            None => return Err(LineRejected::MissingSeparator(BRIDGE_SEPARATOR)),
        }

        let commands: Vec<CommandMessage> = Self::COMMAND_FIELDS
            .iter()
            .zip(fields)
            .filter_map(|(&target, field)| {
                let value = parse_bit(field?, "command").ok()?;
                Some(CommandMessage { target, value })
            })
            .collect();

        if commands.is_empty() {
            return Err(LineRejected::NoFields);
        }
        info!("[RX-CMD] {line}");
        Ok(commands)
    }

    fn decode_status(&self, line: &str) -> Result<StatusMessage, LineRejected> {
        let [prefix, temp, humidity, indicator, fan, heater, fog] =
            Self::TOKENS.fixed::<7>(line.trim())?;
        let floor = prefix
            .strip_prefix('F')
            .and_then(|digits| digits.parse::<u8>().ok())
            .ok_or(LineRejected::BadField("floor"))?;

        Ok(StatusMessage {
            id: prefix.to_string(),
            name: String::new(),
            floor,
            temperature_c: parse_reading(temp, "temperature")?,
            humidity_pct: parse_reading(humidity, "humidity")?,
            fog: parse_bit(fog, "fog")?,
            fan: parse_bit(fan, "fan")?,
            heater: parse_bit(heater, "heater")?,
            indicator: parse_bit(indicator, "indicator")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::types::{ActuatorState, NodeIdentity};

    fn chain() -> ChainProfile {
        let mut config = NodeConfig::default();
        config.sanitize();
        ChainProfile::new(&config)
    }

    fn bridge(floor: u8) -> BridgeProfile {
        let config = NodeConfig {
            variant: ProtocolVariant::Bridge,
            identity: NodeIdentity {
                id: format!("F{floor}"),
                display_name: format!("Tang {floor}"),
                floor,
            },
            ..NodeConfig::default()
        };
        BridgeProfile::new(&config)
    }

    #[test]
    fn framed_status_is_one_terminated_line() {
        let line = chain().encode_status(&status(ActuatorState::default()));
        let frame = frame_line(&line);

        assert_eq!(frame.last(), Some(&b'\n'));
        assert_eq!(frame.iter().filter(|&&byte| byte == b'\n').count(), 1);
        assert_eq!(&frame[..frame.len() - 1], line.as_bytes());
    }

    fn status(actuators: ActuatorState) -> StatusMessage {
        StatusMessage::snapshot(&NodeIdentity::default(), 26.84, 80.0, &actuators)
    }

    #[test]
    fn tokenizer_fixed_rejects_missing_and_ignores_extra() {
        let tokens = Tokenizer::new(':');
        assert_eq!(
            tokens.fixed::<3>("a:b"),
            Err(LineRejected::Arity {
                expected: 3,
                found: 2
            })
        );
        assert_eq!(tokens.fixed::<2>("a:b:c"), Ok(["a", "b"]));
    }

    #[test]
    fn tokenizer_key_value_splits_on_first_separator() {
        let tokens = Tokenizer::new('#');
        assert_eq!(tokens.key_value("fan2#1#x"), Ok(("fan2", "1#x")));
        assert_eq!(tokens.key_value("#1"), Err(LineRejected::EmptyKey));
        assert_eq!(
            tokens.key_value("fan2"),
            Err(LineRejected::MissingSeparator('#'))
        );
    }

    #[test]
    fn chain_status_layout() {
        let line = chain().encode_status(&status(ActuatorState {
            fog: true,
            fan: true,
            heater: false,
            indicator: true,
        }));
        assert_eq!(line, "ESP002#Tang 2#26.8#80.0#1#1#0#1");
    }

    #[test]
    fn chain_decodes_own_floor_keys() {
        let profile = chain();
        assert_eq!(
            profile.decode_command("fan2#1"),
            Ok(vec![CommandMessage {
                target: Actuator::Fan,
                value: true
            }])
        );
        assert_eq!(
            profile.decode_command("  led2#0 "),
            Ok(vec![CommandMessage {
                target: Actuator::Indicator,
                value: false
            }])
        );
        assert_eq!(
            profile.decode_command("heater2#7"),
            Ok(vec![CommandMessage {
                target: Actuator::Heater,
                value: true
            }])
        );
    }

    #[test]
    fn chain_non_numeric_value_reads_as_off() {
        assert_eq!(
            chain().decode_command("fog2#on"),
            Ok(vec![CommandMessage {
                target: Actuator::Fog,
                value: false
            }])
        );
    }

    #[test]
    fn chain_discards_other_floors_and_echoes() {
        let profile = chain();
        assert_eq!(
            profile.decode_command("fan1#1"),
            Err(LineRejected::UnknownKey("fan1".to_string()))
        );
        assert_eq!(
            profile.decode_command("ESP002#26.8#80.0#1#1#0#1"),
            Err(LineRejected::Echo)
        );
        assert_eq!(
            profile.decode_command("ESP001#Tang 1#26.8#80.0#1#1#0#1"),
            Err(LineRejected::Echo)
        );
        assert_eq!(
            profile.decode_command(&format!("fan2#{}", "1".repeat(60))),
            Err(LineRejected::TooLong { max: 50 })
        );
        assert_eq!(
            profile.decode_command("fan2"),
            Err(LineRejected::MissingSeparator('#'))
        );
        assert_eq!(profile.decode_command("#1"), Err(LineRejected::EmptyKey));
    }

    #[test]
    fn chain_status_round_trip() {
        let profile = chain();
        let sent = status(ActuatorState {
            fog: false,
            fan: true,
            heater: true,
            indicator: false,
        });
        let received = profile.decode_status(&profile.encode_status(&sent)).unwrap();

        assert_eq!(received.id, "ESP002");
        assert_eq!(received.name, "Tang 2");
        assert_eq!(received.floor, 2);
        assert_eq!(received.temperature_c, 26.8);
        assert_eq!(received.actuators(), sent.actuators());
    }

    #[test]
    fn bridge_status_layout() {
        let profile = bridge(1);
        let mut sent = status(ActuatorState {
            fog: true,
            fan: false,
            heater: false,
            indicator: true,
        });
        sent.floor = 1;
        sent.temperature_c = 28.5;
        sent.humidity_pct = 75.2;

        assert_eq!(profile.encode_status(&sent), "F1:28.5:75.2:1:0:0:1");
    }

    #[test]
    fn bridge_applies_only_binary_fields() {
        assert_eq!(
            bridge(2).decode_command("C2:1:x:0"),
            Ok(vec![
                CommandMessage {
                    target: Actuator::Indicator,
                    value: true
                },
                CommandMessage {
                    target: Actuator::Heater,
                    value: false
                },
            ])
        );
    }

    #[test]
    fn bridge_ignores_other_floors_and_noise() {
        let profile = bridge(2);
        assert_eq!(
            profile.decode_command("C1:1:1:1:1"),
            Err(LineRejected::WrongFloor)
        );
        assert_eq!(
            profile.decode_command("C2"),
            Err(LineRejected::TooShort { min: 4 })
        );
        assert_eq!(
            profile.decode_command("F2:28.5:75.2:1:0:0:1"),
            Err(LineRejected::Echo)
        );
        assert_eq!(
            profile.decode_command("C2:x:y:z:w"),
            Err(LineRejected::NoFields)
        );
    }

    #[test]
    fn bridge_status_round_trip() {
        let profile = bridge(3);
        let mut sent = status(ActuatorState {
            fog: true,
            fan: true,
            heater: false,
            indicator: false,
        });
        sent.floor = 3;
        let received = profile.decode_status(&profile.encode_status(&sent)).unwrap();

        assert_eq!(received.floor, 3);
        assert_eq!(received.humidity_pct, 80.0);
        assert_eq!(received.actuators(), sent.actuators());
    }

    #[test]
    fn profile_follows_configured_variant() {
        let config = NodeConfig {
            variant: ProtocolVariant::Bridge,
            ..NodeConfig::default()
        };
        assert_eq!(build_profile(&config).variant(), ProtocolVariant::Bridge);
        assert_eq!(
            build_profile(&NodeConfig::default()).variant(),
            ProtocolVariant::Chain
        );
    }
}
