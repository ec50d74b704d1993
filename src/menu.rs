//! Button menus attached to replies.

use crate::action::Action;
use crate::api::POPULAR_ASSETS;
use crate::format::format_threshold;

/// Threshold values offered as one-tap presets.
pub const THRESHOLD_PRESETS: [f64; 6] = [0.5, 1.0, 2.0, 3.0, 5.0, 10.0];

pub const HELP_TEXT: &str = "\
Price change alerts

Add asset      pick a popular asset or enter your own
My assets      list tracked assets and manage them
Price lookup   fetch the current price of any asset
Thresholds     set the default or a per-asset threshold
Check changes  compare your assets against their last prices

Commands: /start /list /add <asset> /threshold <value> /check /cancel /help

You can also type an asset name (bitcoin) or a number (1.5) at any time.";

#[derive(Debug, Clone, PartialEq)]
pub struct Button {
    pub label: String,
    pub action: Action,
}

impl Button {
    pub fn new(label: impl Into<String>, action: Action) -> Self {
        Self {
            label: label.into(),
            action,
        }
    }
}

/// Rows of buttons.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Menu {
    pub rows: Vec<Vec<Button>>,
}

impl Menu {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn row(mut self, buttons: impl IntoIterator<Item = Button>) -> Self {
        let row: Vec<Button> = buttons.into_iter().collect();
        if !row.is_empty() {
            self.rows.push(row);
        }
        self
    }

    pub fn button(self, label: impl Into<String>, action: Action) -> Self {
        self.row([Button::new(label, action)])
    }

    /// Lay `buttons` out `per_row` at a time.
    pub fn grid(mut self, buttons: Vec<Button>, per_row: usize) -> Self {
        let mut buttons = buttons.into_iter().peekable();
        while buttons.peek().is_some() {
            self = self.row(buttons.by_ref().take(per_row.max(1)));
        }
        self
    }

    pub fn back_to_main(self) -> Self {
        self.button("Main menu", Action::MainMenu)
    }

    pub fn buttons(&self) -> impl Iterator<Item = &Button> {
        self.rows.iter().flatten()
    }
}

pub fn main_menu() -> Menu {
    Menu::new()
        .row([
            Button::new("Add asset", Action::AddMenu),
            Button::new("My assets", Action::ListAssets),
        ])
        .row([
            Button::new("Price lookup", Action::LookupPrompt),
            Button::new("Thresholds", Action::ThresholdMenu),
        ])
        .row([
            Button::new("Check changes", Action::CheckChanges),
            Button::new("Help", Action::Help),
        ])
}

pub fn back_menu() -> Menu {
    Menu::new().back_to_main()
}

/// Popular assets plus a free-text option.
pub fn add_menu() -> Menu {
    let popular = POPULAR_ASSETS
        .iter()
        .map(|(id, label)| Button::new(*label, Action::Add(id.to_string())))
        .collect();
    Menu::new()
        .grid(popular, 2)
        .button("Other asset", Action::AddPrompt)
        .back_to_main()
}

/// One button per tracked asset, two per row.
pub fn asset_list(assets: &[String]) -> Menu {
    asset_picker(assets, |asset| Action::AssetDetails(asset.to_string()))
        .button("Remove by name", Action::RemovePrompt)
        .back_to_main()
}

fn asset_picker(assets: &[String], action: impl Fn(&str) -> Action) -> Menu {
    let buttons = assets
        .iter()
        .map(|asset| Button::new(asset.clone(), action(asset)))
        .collect();
    Menu::new().grid(buttons, 2)
}

pub fn asset_details(asset: &str) -> Menu {
    Menu::new()
        .button("Change threshold", Action::OverrideMenu(asset.to_string()))
        .button("Refresh price", Action::Lookup(asset.to_string()))
        .button("Remove asset", Action::ConfirmRemove(asset.to_string()))
        .button("Back to list", Action::ListAssets)
        .back_to_main()
}

pub fn confirm_remove(asset: &str) -> Menu {
    Menu::new().row([
        Button::new("Yes, remove", Action::Remove(asset.to_string())),
        Button::new("No, keep it", Action::AssetDetails(asset.to_string())),
    ])
}

/// Offered after a price lookup or when free text names a known asset.
pub fn offer_asset(asset: &str) -> Menu {
    Menu::new()
        .button(format!("Track {asset}"), Action::Add(asset.to_string()))
        .button("Price", Action::Lookup(asset.to_string()))
        .back_to_main()
}

pub fn after_add(asset: &str) -> Menu {
    Menu::new()
        .button("Set threshold", Action::OverrideMenu(asset.to_string()))
        .button("Add another", Action::AddMenu)
        .button("My assets", Action::ListAssets)
        .back_to_main()
}

pub fn empty_list() -> Menu {
    Menu::new().button("Add asset", Action::AddMenu).back_to_main()
}

pub fn threshold_menu() -> Menu {
    Menu::new()
        .button("Default threshold", Action::DefaultThresholdMenu)
        .button("Per-asset threshold", Action::OverrideSelection)
        .button("View thresholds", Action::ViewThresholds)
        .back_to_main()
}

fn preset_buttons(action: impl Fn(f64) -> Action) -> Vec<Button> {
    THRESHOLD_PRESETS
        .iter()
        .map(|value| Button::new(format_threshold(*value), action(*value)))
        .collect()
}

pub fn default_threshold_menu() -> Menu {
    Menu::new()
        .grid(preset_buttons(Action::SetDefaultThreshold), 3)
        .button("Custom value", Action::DefaultThresholdPrompt)
        .button("Back", Action::ThresholdMenu)
}

pub fn override_selection(assets: &[String]) -> Menu {
    asset_picker(assets, |asset| Action::OverrideMenu(asset.to_string()))
        .button("Back", Action::ThresholdMenu)
}

pub fn override_menu(asset: &str, has_override: bool) -> Menu {
    let menu = Menu::new()
        .grid(
            preset_buttons(|value| Action::SetOverride(asset.to_string(), value)),
            3,
        )
        .button("Custom value", Action::OverridePrompt(asset.to_string()));
    let menu = if has_override {
        menu.button("Use default instead", Action::RemoveOverride(asset.to_string()))
    } else {
        menu
    };
    menu.button("Back", Action::AssetDetails(asset.to_string()))
}

pub fn after_threshold_change(asset: Option<&str>) -> Menu {
    let menu = Menu::new().button("View thresholds", Action::ViewThresholds);
    let menu = match asset {
        Some(asset) => menu.button("Back to asset", Action::AssetDetails(asset.to_string())),
        None => menu.button("More settings", Action::ThresholdMenu),
    };
    menu.back_to_main()
}

pub fn after_check() -> Menu {
    Menu::new()
        .button("Check again", Action::CheckChanges)
        .button("My assets", Action::ListAssets)
        .back_to_main()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_menus() -> Vec<Menu> {
        let assets = vec!["bitcoin".to_string(), "shiba-inu".to_string(), "pepe".to_string()];
        vec![
            main_menu(),
            add_menu(),
            asset_list(&assets),
            asset_details("bitcoin"),
            confirm_remove("bitcoin"),
            offer_asset("pepe"),
            threshold_menu(),
            default_threshold_menu(),
            override_selection(&assets),
            override_menu("bitcoin", true),
            after_check(),
        ]
    }

    #[test]
    fn test_every_button_identifier_decodes_back() {
        for menu in all_menus() {
            for button in menu.buttons() {
                let decoded: Action = button.action.to_string().parse().unwrap();
                assert_eq!(decoded, button.action, "button '{}'", button.label);
            }
        }
    }

    #[test]
    fn test_grid_layout() {
        let menu = asset_list(&["a".into(), "b".into(), "c".into()]);
        assert_eq!(menu.rows[0].len(), 2);
        assert_eq!(menu.rows[1].len(), 1);
        assert_eq!(add_menu().rows[0].len(), 2);
    }

    #[test]
    fn test_threshold_presets() {
        let menu = default_threshold_menu();
        let presets: Vec<f64> = menu
            .buttons()
            .filter_map(|b| match b.action {
                Action::SetDefaultThreshold(v) => Some(v),
                _ => None,
            })
            .collect();
        assert_eq!(presets, THRESHOLD_PRESETS);
        assert_eq!(menu.rows[0][0].label, "0.5%");
    }

    #[test]
    fn test_override_menu_offers_removal_only_when_set() {
        let has_remove = |menu: &Menu| {
            menu.buttons()
                .any(|b| matches!(b.action, Action::RemoveOverride(_)))
        };
        assert!(has_remove(&override_menu("bitcoin", true)));
        assert!(!has_remove(&override_menu("bitcoin", false)));
    }
}
