//! Interactive handler: turns commands, button presses and free text into replies.
//!
//! Every inbound event registers its subscriber first. Button identifiers and
//! commands are decoded once into [`Action`] and [`Command`]; free text is
//! routed to the pending input flow if there is one, otherwise to a small
//! heuristic (a number sets the default threshold, a known asset offers to
//! track it).

use std::sync::Arc;

use chrono::Local;
use tracing::{debug, info, warn};

use crate::action::{Action, ActionError, Command, is_asset_token};
use crate::api::{QuoteResolver, expand_asset};
use crate::conversation::{Conversation, PendingInput};
use crate::engine::ChangeDetector;
use crate::error::StoreError;
use crate::format::{format_event_line, format_price, format_threshold};
use crate::menu::{self, Menu};
use crate::models::SubscriberId;
use crate::notify::Notifier;
use crate::store::SubscriptionStore;
use crate::threshold::{ThresholdError, ThresholdSource, effective_threshold, parse_threshold};

const WELCOME: &str = "Welcome! I watch asset prices and tell you when one moves \
by more than your threshold.\n\nChoose an action:";

const NOT_UNDERSTOOD: &str = "I did not understand that.\n\n\
You can:\n\
- type an asset name (bitcoin)\n\
- type a number to set your default threshold (1.5)\n\
- use the menu buttons\n\n\
Or send /start for the main menu.";

const QUOTES_UNAVAILABLE: &str = "Could not reach the price source right now. Try again later.";

/// What arrived from the chat transport.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    /// A slash command line such as `/add bitcoin`
    Command(String),
    /// A raw button identifier
    Action(String),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
    pub subscriber: SubscriberId,
    pub display_name: String,
    pub kind: EventKind,
}

impl InboundEvent {
    pub fn new(subscriber: SubscriberId, display_name: impl Into<String>, kind: EventKind) -> Self {
        Self {
            subscriber,
            display_name: display_name.into(),
            kind,
        }
    }
}

/// Messages to send back, optionally with a menu under the last one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reply {
    pub messages: Vec<String>,
    pub menu: Option<Menu>,
}

impl Reply {
    pub fn text(message: impl Into<String>) -> Self {
        Self {
            messages: vec![message.into()],
            menu: None,
        }
    }

    pub fn with_menu(mut self, menu: Menu) -> Self {
        self.menu = Some(menu);
        self
    }

    /// All messages joined, mostly for logging and tests.
    pub fn body(&self) -> String {
        self.messages.join("\n\n")
    }
}

pub struct Bot<R, N> {
    store: Arc<SubscriptionStore>,
    resolver: Arc<R>,
    detector: Arc<ChangeDetector<R, N>>,
    conversation: Conversation,
}

impl<R: QuoteResolver, N: Notifier> Bot<R, N> {
    pub fn new(
        store: Arc<SubscriptionStore>,
        resolver: Arc<R>,
        detector: Arc<ChangeDetector<R, N>>,
    ) -> Self {
        Self {
            store,
            resolver,
            detector,
            conversation: Conversation::new(),
        }
    }

    #[cfg(test)]
    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Handle one inbound event.
    pub async fn handle(&self, event: InboundEvent) -> Reply {
        let id = event.subscriber;
        let reply = self.route(event).await;
        debug!(
            subscriber = id,
            messages = reply.messages.len(),
            buttons = reply.menu.as_ref().map_or(0, |m| m.buttons().count()),
            pending = ?self.conversation.current(id),
            "reply ready"
        );
        reply
    }

    async fn route(&self, event: InboundEvent) -> Reply {
        let id = event.subscriber;
        match self.store.ensure_subscriber(id, &event.display_name) {
            Ok(true) => info!(subscriber = id, name = %event.display_name, "new subscriber"),
            Ok(false) => {}
            // The record exists in memory either way
            Err(e) => warn!(subscriber = id, error = %e, "failed to register subscriber"),
        }

        match event.kind {
            EventKind::Command(raw) => match raw.parse::<Command>() {
                Ok(command) => self.handle_command(id, command).await,
                Err(e) => {
                    debug!(subscriber = id, error = %e, "unknown command");
                    Reply::text("Unknown command. Send /help to see what I can do.")
                        .with_menu(menu::main_menu())
                }
            },
            EventKind::Action(raw) => match raw.parse::<Action>() {
                Ok(action) => self.handle_action(id, action).await,
                Err(ActionError::Threshold(e)) => Reply::text(e.to_string()).with_menu(menu::main_menu()),
                Err(e) => {
                    warn!(subscriber = id, error = %e, "undecodable action");
                    Reply::text("Unknown action.").with_menu(menu::main_menu())
                }
            },
            EventKind::Text(text) => self.handle_text(id, &text).await,
        }
    }

    async fn handle_command(&self, id: SubscriberId, command: Command) -> Reply {
        match command {
            Command::Start => {
                self.conversation.cancel(id);
                Reply::text(WELCOME).with_menu(menu::main_menu())
            }
            Command::Help => help(),
            Command::Cancel => self.cancel(id),
            Command::List => self.list_assets(id),
            Command::Add(Some(asset)) => self.add_asset(id, &asset).await,
            Command::Add(None) => self.prompt_add(id),
            Command::Threshold(Some(value)) => self.set_default_from_text(id, &value),
            Command::Threshold(None) => self.default_threshold_menu(id),
            Command::Check => self.check_changes(id).await,
        }
    }

    async fn handle_action(&self, id: SubscriberId, action: Action) -> Reply {
        debug!(subscriber = id, %action, "action");
        match action {
            Action::MainMenu => {
                self.conversation.cancel(id);
                Reply::text("Main menu\n\nChoose an action:").with_menu(menu::main_menu())
            }
            Action::AddMenu => Reply::text("Add an asset\n\nPick a popular asset or enter your own:")
                .with_menu(menu::add_menu()),
            Action::AddPrompt => self.prompt_add(id),
            Action::Add(asset) => self.add_asset(id, &asset).await,
            Action::ListAssets => self.list_assets(id),
            Action::AssetDetails(asset) => self.asset_details(id, &asset).await,
            Action::LookupPrompt => {
                self.conversation.begin(id, PendingInput::AwaitingLookupAsset);
                Reply::text(
                    "Price lookup\n\nEnter the asset name (for example bitcoin, ethereum, solana), \
                     or /cancel.",
                )
                .with_menu(menu::back_menu())
            }
            Action::Lookup(asset) => self.lookup(id, &asset).await,
            Action::RemovePrompt => {
                self.conversation.begin(id, PendingInput::AwaitingRemoveAsset);
                Reply::text("Remove an asset\n\nEnter the asset name to remove, or /cancel.")
                    .with_menu(menu::back_menu())
            }
            Action::ConfirmRemove(asset) => {
                if !self.tracks(id, &asset) {
                    return not_tracked(&asset);
                }
                Reply::text(format!(
                    "Remove {}?\n\nIts threshold and last price are dropped with it.",
                    asset.to_uppercase()
                ))
                .with_menu(menu::confirm_remove(&asset))
            }
            Action::Remove(asset) => self.remove_asset(id, &asset),
            Action::ThresholdMenu => Reply::text("Notification thresholds\n\nChoose what to configure:")
                .with_menu(menu::threshold_menu()),
            Action::DefaultThresholdMenu => self.default_threshold_menu(id),
            Action::DefaultThresholdPrompt => {
                self.conversation.begin(id, PendingInput::AwaitingDefaultThreshold);
                Reply::text("Default threshold\n\nEnter a percentage, for example 1.5, or /cancel.")
                    .with_menu(Menu::new().button("Back", Action::DefaultThresholdMenu))
            }
            Action::SetDefaultThreshold(value) => self.set_default(id, value),
            Action::OverrideSelection => {
                let assets = self.store.tracked_assets(id);
                if assets.is_empty() {
                    return nothing_tracked();
                }
                Reply::text("Per-asset threshold\n\nPick the asset to configure:")
                    .with_menu(menu::override_selection(&assets))
            }
            Action::OverrideMenu(asset) => self.override_menu(id, &asset),
            Action::OverridePrompt(asset) => {
                if !self.tracks(id, &asset) {
                    return not_tracked(&asset);
                }
                let text = format!(
                    "Individual threshold for {}\n\nEnter a percentage, for example 1.5, or /cancel.",
                    asset.to_uppercase()
                );
                self.conversation
                    .begin(id, PendingInput::AwaitingOverrideThreshold(asset.clone()));
                Reply::text(text).with_menu(Menu::new().button("Back", Action::OverrideMenu(asset)))
            }
            Action::SetOverride(asset, value) => self.set_override(id, &asset, value),
            Action::RemoveOverride(asset) => match self.store.remove_override_threshold(id, &asset) {
                Ok(()) => Reply::text(format!(
                    "Individual threshold for {} removed. The default threshold applies again.",
                    asset.to_uppercase()
                ))
                .with_menu(menu::after_threshold_change(Some(asset.as_str()))),
                Err(e) => store_error(&e),
            },
            Action::ViewThresholds => self.view_thresholds(id),
            Action::CheckChanges => self.check_changes(id).await,
            Action::Help => help(),
            Action::Cancel => self.cancel(id),
        }
    }

    async fn handle_text(&self, id: SubscriberId, text: &str) -> Reply {
        let text = text.trim();
        if text.is_empty() {
            return Reply::default();
        }

        // Taking the flow clears it, so bad input is not prompted for again
        match self.conversation.take(id) {
            PendingInput::None => self.fallback(id, text).await,
            PendingInput::AwaitingLookupAsset => self.lookup(id, text).await,
            PendingInput::AwaitingAddAsset => self.add_asset(id, text).await,
            PendingInput::AwaitingRemoveAsset => self.remove_asset(id, &expand_asset(text)),
            PendingInput::AwaitingDefaultThreshold => self.set_default_from_text(id, text),
            PendingInput::AwaitingOverrideThreshold(asset) => match parse_threshold(text) {
                Ok(value) => self.set_override(id, &asset, value),
                Err(e) => Reply::text(e.to_string()).with_menu(menu::main_menu()),
            },
        }
    }

    async fn fallback(&self, id: SubscriberId, text: &str) -> Reply {
        match parse_threshold(text) {
            Ok(value) => return self.set_default(id, value),
            Err(e @ ThresholdError::OutOfRange { .. }) => {
                return Reply::text(e.to_string()).with_menu(menu::main_menu());
            }
            Err(ThresholdError::Parse(_)) => {}
        }

        let asset = expand_asset(text);
        if is_asset_token(&asset) {
            match self.resolver.resolve(&asset).await {
                Ok(Some(price)) => {
                    return Reply::text(format!(
                        "Found {}: {}\n\nWhat would you like to do?",
                        asset.to_uppercase(),
                        format_price(price)
                    ))
                    .with_menu(menu::offer_asset(&asset));
                }
                Ok(None) => {}
                Err(e) => debug!(error = %e, "fallback lookup failed"),
            }
        }
        Reply::text(NOT_UNDERSTOOD).with_menu(menu::main_menu())
    }

    fn cancel(&self, id: SubscriberId) -> Reply {
        let message = if self.conversation.cancel(id) {
            "Cancelled."
        } else {
            "Nothing to cancel."
        };
        Reply::text(message).with_menu(menu::main_menu())
    }

    fn prompt_add(&self, id: SubscriberId) -> Reply {
        self.conversation.begin(id, PendingInput::AwaitingAddAsset);
        Reply::text(
            "Add your own asset\n\nEnter its name (for example bitcoin, ethereum, solana), or /cancel.",
        )
        .with_menu(menu::back_menu())
    }

    fn tracks(&self, id: SubscriberId, asset: &str) -> bool {
        self.store
            .subscriber(id)
            .is_some_and(|record| record.tracks(asset))
    }

    /// Verify the asset with the quote source, track it and seed its baseline.
    async fn add_asset(&self, id: SubscriberId, raw: &str) -> Reply {
        let asset = expand_asset(raw);
        if !is_asset_token(&asset) {
            return invalid_asset(raw);
        }
        if self.tracks(id, &asset) {
            return already_tracked(&asset);
        }

        let price = match self.resolver.resolve(&asset).await {
            Ok(Some(price)) => price,
            Ok(None) => {
                return Reply::text(format!(
                    "'{asset}' was not found. Check the spelling; asset ids look like \
                     pepe, shiba-inu or dogwifhat."
                ))
                .with_menu(
                    Menu::new()
                        .button("Try again", Action::AddPrompt)
                        .back_to_main(),
                );
            }
            Err(e) => {
                warn!(subscriber = id, asset = %asset, error = %e, "could not verify asset");
                return Reply::text(QUOTES_UNAVAILABLE).with_menu(menu::main_menu());
            }
        };

        match self.store.add_asset(id, &asset) {
            Ok(()) => {}
            Err(StoreError::AlreadyTracked(_)) => return already_tracked(&asset),
            Err(e) => return store_error(&e),
        }
        if let Err(e) = self.store.update_last_price(id, &asset, price) {
            warn!(subscriber = id, asset = %asset, error = %e, "failed to seed baseline");
        }
        info!(subscriber = id, asset = %asset, price, "asset added");

        Reply::text(format!(
            "{} added.\nCurrent price: {}\nThreshold: {}\n\nWhat next?",
            asset.to_uppercase(),
            format_price(price),
            format_threshold(self.store.effective_threshold(id, &asset))
        ))
        .with_menu(menu::after_add(&asset))
    }

    fn remove_asset(&self, id: SubscriberId, asset: &str) -> Reply {
        match self.store.remove_asset(id, asset) {
            Ok(()) => {
                info!(subscriber = id, asset = %asset, "asset removed");
                Reply::text(format!(
                    "{} removed.\nAssets left: {}",
                    asset.to_uppercase(),
                    self.store.tracked_assets(id).len()
                ))
                .with_menu(
                    Menu::new()
                        .button("My assets", Action::ListAssets)
                        .button("Add asset", Action::AddMenu)
                        .back_to_main(),
                )
            }
            Err(e) => store_error(&e),
        }
    }

    async fn lookup(&self, id: SubscriberId, raw: &str) -> Reply {
        let asset = expand_asset(raw);
        if !is_asset_token(&asset) {
            return invalid_asset(raw);
        }

        match self.resolver.resolve(&asset).await {
            Ok(Some(price)) => {
                let tracked = self.tracks(id, &asset);
                if tracked {
                    if let Err(e) = self.store.update_last_price(id, &asset, price) {
                        warn!(subscriber = id, asset = %asset, error = %e, "failed to record looked-up price");
                    }
                }
                let reply = Reply::text(format!(
                    "{}\nPrice: {}\n\n{}",
                    asset.to_uppercase(),
                    format_price(price),
                    Local::now().format("%H:%M:%S")
                ));
                if tracked {
                    reply.with_menu(menu::asset_details(&asset))
                } else {
                    reply.with_menu(menu::offer_asset(&asset))
                }
            }
            Ok(None) => Reply::text(format!("'{asset}' was not found. Check the spelling."))
                .with_menu(menu::back_menu()),
            Err(e) => {
                warn!(asset = %asset, error = %e, "price lookup failed");
                Reply::text(QUOTES_UNAVAILABLE).with_menu(menu::back_menu())
            }
        }
    }

    fn list_assets(&self, id: SubscriberId) -> Reply {
        let assets = self.store.tracked_assets(id);
        if assets.is_empty() {
            return Reply::text("You are not tracking any assets yet.\n\nAdd your first one:")
                .with_menu(menu::add_menu());
        }

        let lines: Vec<String> = assets.iter().map(|a| format!("- {a}")).collect();
        Reply::text(format!(
            "Your assets:\n{}\n\nTotal: {}\n\nPick an asset to manage it:",
            lines.join("\n"),
            assets.len()
        ))
        .with_menu(menu::asset_list(&assets))
    }

    async fn asset_details(&self, id: SubscriberId, asset: &str) -> Reply {
        let Some(record) = self.store.subscriber(id).filter(|r| r.tracks(asset)) else {
            return not_tracked(asset);
        };

        let price = match self.resolver.resolve(asset).await {
            Ok(Some(price)) => format!("Price: {}\n", format_price(price)),
            Ok(None) => String::new(),
            Err(e) => {
                debug!(asset = %asset, error = %e, "price unavailable for details");
                String::new()
            }
        };
        Reply::text(format!(
            "{}\n\n{}Threshold: {} ({})\n\nChoose an action:",
            asset.to_uppercase(),
            price,
            format_threshold(effective_threshold(Some(&record), asset)),
            ThresholdSource::of(&record, asset)
        ))
        .with_menu(menu::asset_details(asset))
    }

    fn default_threshold_menu(&self, id: SubscriberId) -> Reply {
        Reply::text(format!(
            "Default threshold\n\nCurrent: {}\n\nIt applies to every asset without an \
             individual threshold. Choose a new value:",
            format_threshold(self.store.default_threshold(id))
        ))
        .with_menu(menu::default_threshold_menu())
    }

    fn set_default_from_text(&self, id: SubscriberId, text: &str) -> Reply {
        match parse_threshold(text) {
            Ok(value) => self.set_default(id, value),
            Err(e) => Reply::text(e.to_string()).with_menu(menu::main_menu()),
        }
    }

    fn set_default(&self, id: SubscriberId, value: f64) -> Reply {
        match self.store.set_default_threshold(id, value) {
            Ok(()) => {
                info!(subscriber = id, threshold = value, "default threshold set");
                Reply::text(format!(
                    "Default threshold set to {0}.\n\nYou will be notified when an asset without \
                     an individual threshold moves by {0} or more.",
                    format_threshold(value)
                ))
                .with_menu(menu::after_threshold_change(None))
            }
            Err(e) => store_error(&e),
        }
    }

    fn override_menu(&self, id: SubscriberId, asset: &str) -> Reply {
        let Some(record) = self.store.subscriber(id).filter(|r| r.tracks(asset)) else {
            return not_tracked(asset);
        };
        Reply::text(format!(
            "Individual threshold for {}\n\nCurrent: {} ({})\n\nAn individual threshold takes \
             precedence over the default. Choose a new value:",
            asset.to_uppercase(),
            format_threshold(effective_threshold(Some(&record), asset)),
            ThresholdSource::of(&record, asset)
        ))
        .with_menu(menu::override_menu(
            asset,
            self.store.override_threshold(id, asset).is_some(),
        ))
    }

    fn set_override(&self, id: SubscriberId, asset: &str, value: f64) -> Reply {
        match self.store.set_override_threshold(id, asset, value) {
            Ok(()) => {
                info!(subscriber = id, asset = %asset, threshold = value, "individual threshold set");
                Reply::text(format!(
                    "Threshold for {} set to {}.",
                    asset.to_uppercase(),
                    format_threshold(value)
                ))
                .with_menu(menu::after_threshold_change(Some(asset)))
            }
            Err(e) => store_error(&e),
        }
    }

    fn view_thresholds(&self, id: SubscriberId) -> Reply {
        let Some(record) = self.store.subscriber(id).filter(|r| !r.assets.is_empty()) else {
            return nothing_tracked();
        };

        let mut text = format!(
            "Default threshold: {}\n\nPer asset:",
            format_threshold(record.default_threshold)
        );
        for asset in &record.assets {
            text.push_str(&format!(
                "\n- {}: {} ({})",
                asset,
                format_threshold(effective_threshold(Some(&record), asset)),
                ThresholdSource::of(&record, asset)
            ));
        }
        Reply::text(text).with_menu(
            Menu::new()
                .button("Configure thresholds", Action::ThresholdMenu)
                .button("My assets", Action::ListAssets)
                .back_to_main(),
        )
    }

    async fn check_changes(&self, id: SubscriberId) -> Reply {
        let total = self.store.tracked_assets(id).len();
        if total == 0 {
            return nothing_tracked();
        }

        match self.detector.check_subscriber(id).await {
            Ok(events) if events.is_empty() => Reply::text(format!(
                "No changes. None of your {total} assets moved past its threshold."
            ))
            .with_menu(menu::after_check()),
            Ok(events) => {
                let lines: Vec<String> = events.iter().map(format_event_line).collect();
                Reply::text(format!(
                    "Changes detected: {} of {}\n\n{}",
                    events.len(),
                    total,
                    lines.join("\n")
                ))
                .with_menu(menu::after_check())
            }
            Err(e) => {
                warn!(subscriber = id, error = %e, "on-demand check failed");
                Reply::text(QUOTES_UNAVAILABLE).with_menu(menu::after_check())
            }
        }
    }
}

fn help() -> Reply {
    Reply::text(menu::HELP_TEXT).with_menu(menu::back_menu())
}

fn nothing_tracked() -> Reply {
    Reply::text("You are not tracking any assets yet. Add one first:").with_menu(menu::empty_list())
}

fn not_tracked(asset: &str) -> Reply {
    store_error(&StoreError::NotTracked(asset.to_string()))
}

fn already_tracked(asset: &str) -> Reply {
    Reply::text(format!("{asset} is already in your list.")).with_menu(
        Menu::new()
            .button("Manage it", Action::AssetDetails(asset.to_string()))
            .button("Add another", Action::AddMenu)
            .back_to_main(),
    )
}

fn invalid_asset(raw: &str) -> Reply {
    Reply::text(format!(
        "'{}' is not a valid asset name. Use the id from the price source, e.g. shiba-inu.",
        raw.trim()
    ))
    .with_menu(menu::main_menu())
}

/// Map a store failure to guidance for the subscriber.
fn store_error(error: &StoreError) -> Reply {
    if !error.is_not_found() {
        warn!(error = %error, "store operation failed");
    }
    let text = match error {
        StoreError::UnknownSubscriber(_) => "Send /start first.".to_string(),
        StoreError::AlreadyTracked(asset) => format!("{asset} is already in your list."),
        StoreError::NotTracked(asset) => format!("{asset} is not in your list."),
        StoreError::NoOverride(asset) => format!("{asset} has no individual threshold."),
        StoreError::Persistence { .. } => {
            "The change could not be saved. It stays active until restart; try again later."
                .to_string()
        }
    };
    Reply::text(text).with_menu(menu::main_menu())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::FakeResolver;
    use crate::notify::testing::RecordingNotifier;
    use std::time::Duration;

    struct Harness {
        bot: Bot<FakeResolver, RecordingNotifier>,
        store: Arc<SubscriptionStore>,
        resolver: Arc<FakeResolver>,
        notifier: Arc<RecordingNotifier>,
    }

    fn harness(prices: &[(&str, f64)]) -> Harness {
        let store = Arc::new(SubscriptionStore::in_memory());
        let resolver = Arc::new(FakeResolver::with_prices(prices));
        let notifier = Arc::new(RecordingNotifier::default());
        let detector = Arc::new(ChangeDetector::new(
            store.clone(),
            resolver.clone(),
            notifier.clone(),
            Duration::from_secs(60),
        ));
        let bot = Bot::new(store.clone(), resolver.clone(), detector);
        Harness { bot, store, resolver, notifier }
    }

    impl Harness {
        async fn text(&self, text: &str) -> Reply {
            self.bot
                .handle(InboundEvent::new(1, "alice", EventKind::Text(text.to_string())))
                .await
        }

        async fn press(&self, action: &str) -> Reply {
            self.bot
                .handle(InboundEvent::new(1, "alice", EventKind::Action(action.to_string())))
                .await
        }

        async fn command(&self, command: &str) -> Reply {
            self.bot
                .handle(InboundEvent::new(1, "alice", EventKind::Command(command.to_string())))
                .await
        }
    }

    fn offers(reply: &Reply, action: &Action) -> bool {
        reply
            .menu
            .as_ref()
            .is_some_and(|menu| menu.buttons().any(|b| &b.action == action))
    }

    #[tokio::test]
    async fn test_every_event_registers_subscriber() {
        let h = harness(&[]);
        h.command("/start").await;
        let record = h.store.subscriber(1).unwrap();
        assert_eq!(record.display_name, "alice");
        assert_eq!(record.default_threshold, 1.0);
    }

    #[tokio::test]
    async fn test_add_seeds_baseline() {
        let h = harness(&[("bitcoin", 100.0)]);
        let reply = h.press("add:bitcoin").await;
        assert!(reply.body().contains("BITCOIN added"));
        assert_eq!(h.store.tracked_assets(1), vec!["bitcoin".to_string()]);
        assert_eq!(
            h.store.subscriber(1).unwrap().last_prices.get("bitcoin"),
            Some(&100.0)
        );

        let again = h.press("add:bitcoin").await;
        assert!(again.body().contains("already in your list"));
        assert_eq!(h.store.tracked_assets(1).len(), 1);
    }

    #[tokio::test]
    async fn test_add_unknown_or_unreachable_asset_is_not_tracked() {
        let h = harness(&[]);
        let reply = h.command("/add nosuchcoin").await;
        assert!(reply.body().contains("was not found"));

        h.resolver.set_outage(true);
        let reply = h.command("/add bitcoin").await;
        assert_eq!(reply.body(), QUOTES_UNAVAILABLE);
        assert!(h.store.tracked_assets(1).is_empty());
    }

    #[tokio::test]
    async fn test_add_prompt_expands_tickers() {
        let h = harness(&[("ethereum", 3000.0)]);
        h.press("add-prompt").await;
        assert_eq!(h.bot.conversation().current(1), PendingInput::AwaitingAddAsset);

        h.text("ETH").await;
        assert_eq!(h.store.tracked_assets(1), vec!["ethereum".to_string()]);
        assert!(h.bot.conversation().current(1).is_none());
    }

    #[tokio::test]
    async fn test_override_flow_sets_value() {
        let h = harness(&[("bitcoin", 100.0)]);
        h.press("add:bitcoin").await;
        h.press("override-prompt:bitcoin").await;
        assert_eq!(
            h.bot.conversation().current(1),
            PendingInput::AwaitingOverrideThreshold("bitcoin".into())
        );

        let reply = h.text("3.5").await;
        assert!(reply.body().contains("3.5%"));
        assert_eq!(h.store.override_threshold(1, "bitcoin"), Some(3.5));
        assert!(h.bot.conversation().current(1).is_none());
    }

    #[tokio::test]
    async fn test_override_flow_rejects_garbage_without_reprompt() {
        let h = harness(&[("bitcoin", 100.0)]);
        h.press("add:bitcoin").await;
        h.press("override-prompt:bitcoin").await;

        let reply = h.text("abc").await;
        assert!(reply.body().contains("not a number"));
        assert_eq!(h.store.override_threshold(1, "bitcoin"), None);
        assert!(h.bot.conversation().current(1).is_none());

        // The next number goes through the fallback instead
        h.text("3.5").await;
        assert_eq!(h.store.override_threshold(1, "bitcoin"), None);
        assert_eq!(h.store.default_threshold(1), 3.5);
    }

    #[tokio::test]
    async fn test_override_prompt_requires_tracked_asset() {
        let h = harness(&[]);
        let reply = h.press("override-prompt:solana").await;
        assert!(reply.body().contains("not in your list"));
        assert!(h.bot.conversation().current(1).is_none());
    }

    #[tokio::test]
    async fn test_fallback_number_sets_default_threshold() {
        let h = harness(&[]);
        h.text("2,5").await;
        assert_eq!(h.store.default_threshold(1), 2.5);

        let reply = h.text("75").await;
        assert!(reply.body().contains("0.1 to 50"));
        assert_eq!(h.store.default_threshold(1), 2.5);
    }

    #[tokio::test]
    async fn test_fallback_known_asset_offers_tracking() {
        let h = harness(&[("bitcoin", 67_000.0)]);
        let reply = h.text("BTC").await;
        assert!(reply.body().contains("BITCOIN"));
        assert!(offers(&reply, &Action::Add("bitcoin".into())));
        assert!(offers(&reply, &Action::Lookup("bitcoin".into())));
        assert!(h.store.tracked_assets(1).is_empty());
    }

    #[tokio::test]
    async fn test_fallback_not_understood() {
        let h = harness(&[]);
        let reply = h.text("hello there").await;
        assert_eq!(reply.body(), NOT_UNDERSTOOD);
        // Not an asset token, so no lookup was made
        assert_eq!(h.resolver.calls(), 0);
    }

    #[tokio::test]
    async fn test_remove_via_prompt_cascades() {
        let h = harness(&[("bitcoin", 100.0)]);
        h.press("add:bitcoin").await;
        h.press("override:bitcoin:2").await;
        assert_eq!(h.store.override_threshold(1, "bitcoin"), Some(2.0));

        h.press("remove-prompt").await;
        let reply = h.text("btc").await;
        assert!(reply.body().contains("BITCOIN removed"));
        assert!(h.store.tracked_assets(1).is_empty());
        assert_eq!(h.store.override_threshold(1, "bitcoin"), None);

        let reply = h.press("remove:bitcoin").await;
        assert!(reply.body().contains("not in your list"));
    }

    #[tokio::test]
    async fn test_override_menu_offers_removal_only_when_set() {
        let h = harness(&[("bitcoin", 100.0)]);
        h.press("add:bitcoin").await;
        let remove = Action::RemoveOverride("bitcoin".into());

        let reply = h.press("override-menu:bitcoin").await;
        assert!(!offers(&reply, &remove));

        h.press("override:bitcoin:5").await;
        let reply = h.press("override-menu:bitcoin").await;
        assert!(reply.body().contains("5%"));
        assert!(offers(&reply, &remove));
    }

    #[tokio::test]
    async fn test_threshold_confirmation_keeps_every_digit() {
        let h = harness(&[]);
        h.press("default-prompt").await;
        let reply = h.text("0.125").await;
        assert!(reply.body().contains("0.125%"));
        assert_eq!(h.store.default_threshold(1), 0.125);
    }

    #[tokio::test]
    async fn test_confirm_remove_offers_both_choices() {
        let h = harness(&[("pepe", 0.00001)]);
        h.press("add:pepe").await;
        let reply = h.press("remove-confirm:pepe").await;
        assert!(offers(&reply, &Action::Remove("pepe".into())));
        assert!(offers(&reply, &Action::AssetDetails("pepe".into())));
        assert_eq!(h.store.tracked_assets(1).len(), 1);
    }

    #[tokio::test]
    async fn test_remove_override_falls_back_to_default() {
        let h = harness(&[("bitcoin", 100.0)]);
        h.press("add:bitcoin").await;
        let reply = h.press("override-remove:bitcoin").await;
        assert!(reply.body().contains("no individual threshold"));

        h.press("override:bitcoin:5").await;
        h.press("default:2").await;
        assert_eq!(h.store.effective_threshold(1, "bitcoin"), 5.0);
        h.press("override-remove:bitcoin").await;
        assert_eq!(h.store.effective_threshold(1, "bitcoin"), 2.0);
    }

    #[tokio::test]
    async fn test_cancel_clears_pending_flow() {
        let h = harness(&[]);
        h.press("lookup-prompt").await;
        let reply = h.command("/cancel").await;
        assert_eq!(reply.messages[0], "Cancelled.");
        assert!(h.bot.conversation().current(1).is_none());

        let reply = h.command("/cancel").await;
        assert_eq!(reply.messages[0], "Nothing to cancel.");
    }

    #[tokio::test]
    async fn test_blank_text_keeps_pending_flow() {
        let h = harness(&[]);
        h.press("default-prompt").await;
        let reply = h.text("   ").await;
        assert!(reply.messages.is_empty());
        assert_eq!(h.bot.conversation().current(1), PendingInput::AwaitingDefaultThreshold);
    }

    #[tokio::test]
    async fn test_unknown_action_and_command() {
        let h = harness(&[]);
        assert_eq!(h.press("bogus").await.messages[0], "Unknown action.");
        assert!(h.press("default:99").await.body().contains("out of range"));
        assert!(h.command("/moon").await.body().contains("Unknown command"));
    }

    #[tokio::test]
    async fn test_lookup_records_baseline_for_tracked_asset() {
        let h = harness(&[("solana", 10.0)]);
        h.press("add:solana").await;
        h.resolver.set_price("solana", 12.0);

        let reply = h.press("lookup:solana").await;
        assert!(reply.body().contains("$12.0000"));
        assert_eq!(
            h.store.subscriber(1).unwrap().last_prices.get("solana"),
            Some(&12.0)
        );
    }

    #[tokio::test]
    async fn test_check_changes_reports_without_dispatching() {
        let h = harness(&[("bitcoin", 100.0), ("ethereum", 10.0)]);
        h.press("add:bitcoin").await;
        h.press("add:ethereum").await;
        h.resolver.set_price("bitcoin", 110.0);

        let reply = h.command("/check").await;
        let body = reply.body();
        assert!(body.contains("Changes detected: 1 of 2"));
        assert!(body.contains("BITCOIN up 10.00%"));
        assert!(h.notifier.sent().is_empty());

        let reply = h.press("check").await;
        assert!(reply.body().starts_with("No changes"));
    }

    #[tokio::test]
    async fn test_view_thresholds_lists_sources() {
        let h = harness(&[("bitcoin", 1.0), ("pepe", 1.0)]);
        h.press("add:bitcoin").await;
        h.press("add:pepe").await;
        h.press("override:pepe:4").await;

        let body = h.press("view-thresholds").await.body();
        assert!(body.contains("- bitcoin: 1% (default)"));
        assert!(body.contains("- pepe: 4% (individual)"));
    }
}
