//! Typed decoding of button identifiers and slash commands.
//!
//! Raw identifiers are parsed exactly once at the transport boundary; the
//! handler then matches exhaustively on [`Action`]. Identifiers are
//! colon-separated, e.g. `add:bitcoin` or `override:bitcoin:2.5`.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::models::normalize_asset;
use crate::threshold::{ThresholdError, parse_threshold};

/// Something a subscriber can select from a menu.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    MainMenu,
    AddMenu,
    AddPrompt,
    Add(String),
    ListAssets,
    AssetDetails(String),
    LookupPrompt,
    Lookup(String),
    RemovePrompt,
    ConfirmRemove(String),
    Remove(String),
    ThresholdMenu,
    DefaultThresholdMenu,
    DefaultThresholdPrompt,
    SetDefaultThreshold(f64),
    OverrideSelection,
    OverrideMenu(String),
    OverridePrompt(String),
    SetOverride(String, f64),
    RemoveOverride(String),
    ViewThresholds,
    CheckChanges,
    Help,
    Cancel,
}

/// Why an identifier or command could not be decoded.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ActionError {
    #[error("unknown action '{0}'")]
    Unknown(String),

    #[error("'{0}' is not a valid asset identifier")]
    InvalidAsset(String),

    #[error(transparent)]
    Threshold(#[from] ThresholdError),

    #[error("unknown command '{0}'")]
    UnknownCommand(String),
}

impl FromStr for Action {
    type Err = ActionError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        let (verb, arg) = match raw.split_once(':') {
            Some((verb, arg)) => (verb, Some(arg)),
            None => (raw, None),
        };

        let action = match (verb, arg) {
            ("menu", None) => Action::MainMenu,
            ("add-menu", None) => Action::AddMenu,
            ("add-prompt", None) => Action::AddPrompt,
            ("add", Some(asset)) => Action::Add(asset_arg(asset)?),
            ("list", None) => Action::ListAssets,
            ("asset", Some(asset)) => Action::AssetDetails(asset_arg(asset)?),
            ("lookup-prompt", None) => Action::LookupPrompt,
            ("lookup", Some(asset)) => Action::Lookup(asset_arg(asset)?),
            ("remove-prompt", None) => Action::RemovePrompt,
            ("remove-confirm", Some(asset)) => Action::ConfirmRemove(asset_arg(asset)?),
            ("remove", Some(asset)) => Action::Remove(asset_arg(asset)?),
            ("thresholds", None) => Action::ThresholdMenu,
            ("default-menu", None) => Action::DefaultThresholdMenu,
            ("default-prompt", None) => Action::DefaultThresholdPrompt,
            ("default", Some(value)) => Action::SetDefaultThreshold(parse_threshold(value)?),
            ("override-select", None) => Action::OverrideSelection,
            ("override-menu", Some(asset)) => Action::OverrideMenu(asset_arg(asset)?),
            ("override-prompt", Some(asset)) => Action::OverridePrompt(asset_arg(asset)?),
            ("override", Some(rest)) => {
                let (asset, value) = rest
                    .rsplit_once(':')
                    .ok_or_else(|| ActionError::Unknown(raw.to_string()))?;
                Action::SetOverride(asset_arg(asset)?, parse_threshold(value)?)
            }
            ("override-remove", Some(asset)) => Action::RemoveOverride(asset_arg(asset)?),
            ("view-thresholds", None) => Action::ViewThresholds,
            ("check", None) => Action::CheckChanges,
            ("help", None) => Action::Help,
            ("cancel", None) => Action::Cancel,
            _ => return Err(ActionError::Unknown(raw.to_string())),
        };
        Ok(action)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::MainMenu => write!(f, "menu"),
            Action::AddMenu => write!(f, "add-menu"),
            Action::AddPrompt => write!(f, "add-prompt"),
            Action::Add(asset) => write!(f, "add:{asset}"),
            Action::ListAssets => write!(f, "list"),
            Action::AssetDetails(asset) => write!(f, "asset:{asset}"),
            Action::LookupPrompt => write!(f, "lookup-prompt"),
            Action::Lookup(asset) => write!(f, "lookup:{asset}"),
            Action::RemovePrompt => write!(f, "remove-prompt"),
            Action::ConfirmRemove(asset) => write!(f, "remove-confirm:{asset}"),
            Action::Remove(asset) => write!(f, "remove:{asset}"),
            Action::ThresholdMenu => write!(f, "thresholds"),
            Action::DefaultThresholdMenu => write!(f, "default-menu"),
            Action::DefaultThresholdPrompt => write!(f, "default-prompt"),
            Action::SetDefaultThreshold(value) => write!(f, "default:{value}"),
            Action::OverrideSelection => write!(f, "override-select"),
            Action::OverrideMenu(asset) => write!(f, "override-menu:{asset}"),
            Action::OverridePrompt(asset) => write!(f, "override-prompt:{asset}"),
            Action::SetOverride(asset, value) => write!(f, "override:{asset}:{value}"),
            Action::RemoveOverride(asset) => write!(f, "override-remove:{asset}"),
            Action::ViewThresholds => write!(f, "view-thresholds"),
            Action::CheckChanges => write!(f, "check"),
            Action::Help => write!(f, "help"),
            Action::Cancel => write!(f, "cancel"),
        }
    }
}

/// Validate an asset embedded in an identifier.
fn asset_arg(raw: &str) -> Result<String, ActionError> {
    let asset = normalize_asset(raw);
    if is_asset_token(&asset) {
        Ok(asset)
    } else {
        Err(ActionError::InvalidAsset(raw.to_string()))
    }
}

/// Asset ids are short lowercase tokens such as `shiba-inu`.
pub fn is_asset_token(asset: &str) -> bool {
    !asset.is_empty()
        && asset.len() <= 64
        && asset
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_' || c == '.')
}

/// Slash commands typed into the chat.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Start,
    Help,
    Cancel,
    List,
    /// `/add` with an optional asset; without one the add prompt starts.
    Add(Option<String>),
    /// `/threshold` with an optional raw value.
    Threshold(Option<String>),
    Check,
}

impl FromStr for Command {
    type Err = ActionError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        let body = raw
            .strip_prefix('/')
            .ok_or_else(|| ActionError::UnknownCommand(raw.to_string()))?;
        let (name, arg) = match body.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, Some(arg.trim()).filter(|a| !a.is_empty())),
            None => (body, None),
        };
        // Telegram style "/add@SomeBot"
        let name = name.split('@').next().unwrap_or(name).to_lowercase();

        match name.as_str() {
            "start" => Ok(Command::Start),
            "help" => Ok(Command::Help),
            "cancel" => Ok(Command::Cancel),
            "list" => Ok(Command::List),
            "add" => Ok(Command::Add(arg.map(str::to_string))),
            "threshold" => Ok(Command::Threshold(arg.map(str::to_string))),
            "check" => Ok(Command::Check),
            _ => Err(ActionError::UnknownCommand(raw.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_parameterised_actions() {
        assert_eq!("add:bitcoin".parse(), Ok(Action::Add("bitcoin".into())));
        assert_eq!("add:Shiba-Inu".parse(), Ok(Action::Add("shiba-inu".into())));
        assert_eq!(
            "override:bitcoin:2.5".parse(),
            Ok(Action::SetOverride("bitcoin".into(), 2.5))
        );
        assert_eq!("default:10".parse(), Ok(Action::SetDefaultThreshold(10.0)));
        assert_eq!(
            "remove-confirm:pepe".parse(),
            Ok(Action::ConfirmRemove("pepe".into()))
        );
    }

    #[test]
    fn test_identifiers_round_trip() {
        let actions = [
            Action::MainMenu,
            Action::Add("shiba-inu".into()),
            Action::SetDefaultThreshold(0.5),
            Action::SetOverride("bitcoin".into(), 1.0),
            Action::OverridePrompt("solana".into()),
            Action::Cancel,
        ];
        for action in actions {
            assert_eq!(action.to_string().parse::<Action>(), Ok(action));
        }
    }

    #[test]
    fn test_decode_rejects_bad_identifiers() {
        assert!(matches!("coin_bitcoin".parse::<Action>(), Err(ActionError::Unknown(_))));
        assert!(matches!("menu:extra".parse::<Action>(), Err(ActionError::Unknown(_))));
        assert!(matches!("add:".parse::<Action>(), Err(ActionError::InvalidAsset(_))));
        assert!(matches!("add:bit coin".parse::<Action>(), Err(ActionError::InvalidAsset(_))));
        assert!(matches!("override:bitcoin".parse::<Action>(), Err(ActionError::Unknown(_))));
        assert!(matches!(
            "default:75".parse::<Action>(),
            Err(ActionError::Threshold(ThresholdError::OutOfRange { .. }))
        ));
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!("/start".parse(), Ok(Command::Start));
        assert_eq!("/add bitcoin".parse(), Ok(Command::Add(Some("bitcoin".into()))));
        assert_eq!("/add".parse(), Ok(Command::Add(None)));
        assert_eq!("/threshold  2.5 ".parse(), Ok(Command::Threshold(Some("2.5".into()))));
        assert_eq!("/List@PriceBot".parse(), Ok(Command::List));
        assert!(matches!("/moon".parse::<Command>(), Err(ActionError::UnknownCommand(_))));
        assert!("start".parse::<Command>().is_err());
    }
}
