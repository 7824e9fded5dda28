//! # Router Module
//!
//! Translates panel tokens into local input for Falcon BMS.
//!
//! A token is one inbound line from a panel, e.g. `ICP_BTN_6 1` or
//! `ICP_HUD_BRT_KNB 40000`. Routing tries, in order:
//!
//! 1. **Alias**: the whole token names a key file callback. An empty
//!    callback suppresses the token.
//! 2. **Axis**: `<name> <value>` where `name` maps to a virtual joystick axis
//! 3. Nothing matched: logged and dropped
//!
//! Callbacks are looked up in the key file and pressed as key combinations.

pub mod axis;
pub mod inject;
pub mod keymap;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::config::KeymapConfig;
use crate::display::InboundHandler;
use crate::error::Result;
use axis::{scale_axis_value, Axis};
use inject::{AxisSink, KeySink};
use keymap::{KeyCombo, Keymap};

/// Pause after each key press so the simulator registers it
pub const KEY_HOLD: Duration = Duration::from_millis(10);

/// What [`CommandRouter::route`] did with a token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Alias with an empty callback
    Suppressed,
    /// Key combination pressed and released
    Key(KeyCombo),
    /// Virtual axis moved
    Axis { axis: Axis, value: u32 },
    /// Alias callback missing from the key file
    UnknownAction(String),
    /// No alias or axis matched
    NotFound,
}

/// Keymap-driven router for panel tokens
pub struct CommandRouter {
    keymap: Keymap,
    aliases: HashMap<String, String>,
    axes: HashMap<String, Axis>,
    keys: Box<dyn KeySink>,
    axis_sink: Box<dyn AxisSink>,
    key_hold: Duration,
}

impl std::fmt::Debug for CommandRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRouter")
            .field("bindings", &self.keymap.len())
            .field("aliases", &self.aliases.len())
            .field("axes", &self.axes.len())
            .finish_non_exhaustive()
    }
}

impl CommandRouter {
    pub fn new(
        keymap: Keymap,
        aliases: HashMap<String, String>,
        axes: HashMap<String, Axis>,
        keys: Box<dyn KeySink>,
        axis_sink: Box<dyn AxisSink>,
    ) -> Self {
        Self {
            keymap,
            aliases,
            axes,
            keys,
            axis_sink,
            key_hold: KEY_HOLD,
        }
    }

    /// Load the key file named in `config` and build a router around it
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Keymap`](crate::error::BridgeError::Keymap) if
    /// the key file cannot be read
    pub fn from_config(
        config: &KeymapConfig,
        keys: Box<dyn KeySink>,
        axis_sink: Box<dyn AxisSink>,
    ) -> Result<Self> {
        let keymap = keymap::load_keymap(&config.path)?;
        for (token, action) in &config.aliases {
            if !action.is_empty() && !keymap.contains_key(action) {
                warn!("Alias '{}' targets '{}', which has no key binding", token, action);
            }
        }
        info!(
            "Router ready: {} bindings, {} aliases, {} axes",
            keymap.len(),
            config.aliases.len(),
            config.axes.len()
        );
        Ok(Self::new(
            keymap,
            config.aliases.clone(),
            config.axes.clone(),
            keys,
            axis_sink,
        ))
    }

    /// Override the pause after key presses
    pub fn with_key_hold(mut self, key_hold: Duration) -> Self {
        self.key_hold = key_hold;
        self
    }

    /// Route one panel token
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Injection`](crate::error::BridgeError::Injection)
    /// if a sink rejects the event. Unmatched tokens are not errors.
    pub async fn route(&mut self, token: &str) -> Result<RouteOutcome> {
        if let Some(action) = self.aliases.get(token) {
            if action.is_empty() {
                debug!("'{}' suppressed", token);
                return Ok(RouteOutcome::Suppressed);
            }

            let Some(combo) = self.keymap.get(action) else {
                warn!("'{}' maps to '{}', which has no key binding", token, action);
                return Ok(RouteOutcome::UnknownAction(action.clone()));
            };

            debug!("'{}' -> {} ({})", token, action, combo);
            self.keys.press_and_release(combo)?;
            let combo = combo.clone();
            tokio::time::sleep(self.key_hold).await;
            return Ok(RouteOutcome::Key(combo));
        }

        let mut parts = token.split_whitespace();
        if let (Some(name), Some(raw), None) = (parts.next(), parts.next(), parts.next()) {
            if let Some(axis) = self.axes.get(name).copied() {
                match raw.parse::<i64>() {
                    Ok(raw) => {
                        let value = scale_axis_value(raw);
                        self.axis_sink.set_axis(axis, value)?;
                        debug!("'{}' -> axis {} = {}", token, axis, value);
                        return Ok(RouteOutcome::Axis { axis, value });
                    }
                    Err(_) => {
                        warn!("'{}': axis value is not an integer", token);
                        return Ok(RouteOutcome::NotFound);
                    }
                }
            }
        }

        info!("'{}' not found", token);
        Ok(RouteOutcome::NotFound)
    }
}

#[async_trait]
impl InboundHandler for CommandRouter {
    async fn handle(&mut self, line: &str) -> Result<()> {
        self.route(line).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::inject::{MockAxisSink, MockKeySink};
    use super::keymap::{parse_keymap, Modifiers};
    use super::*;
    use crate::error::BridgeError;
    use mockall::predicate::eq;
    use mockall::Sequence;

    fn aliases(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(token, action)| (token.to_string(), action.to_string()))
            .collect()
    }

    fn router(
        keyfile: &str,
        alias_pairs: &[(&str, &str)],
        keys: MockKeySink,
        axis_sink: MockAxisSink,
    ) -> CommandRouter {
        CommandRouter::new(
            parse_keymap(keyfile),
            aliases(alias_pairs),
            HashMap::from([("ICP_HUD_BRT_KNB".to_string(), Axis::X)]),
            Box::new(keys),
            Box::new(axis_sink),
        )
        .with_key_hold(Duration::ZERO)
    }

    fn ctrl_a() -> KeyCombo {
        KeyCombo {
            modifiers: Modifiers::from_code(2).unwrap(),
            key: "a",
        }
    }

    // ==================== Keys ====================

    #[tokio::test]
    async fn test_alias_presses_key_combo() {
        let mut keys = MockKeySink::new();
        keys.expect_press_and_release()
            .with(eq(ctrl_a()))
            .times(1)
            .returning(|_| Ok(()));
        let mut axis_sink = MockAxisSink::new();
        axis_sink.expect_set_axis().never();

        let mut router = router(
            "TEST_ACTION 0 0 0x1e 2",
            &[("TEST_ACTION 1", "TEST_ACTION")],
            keys,
            axis_sink,
        );

        let outcome = router.route("TEST_ACTION 1").await.unwrap();
        assert_eq!(outcome, RouteOutcome::Key(ctrl_a()));
        assert_eq!(ctrl_a().to_string(), "ctrl+a");
    }

    #[tokio::test]
    async fn test_repeated_presses_in_order() {
        let mut seq = Sequence::new();
        let mut keys = MockKeySink::new();
        keys.expect_press_and_release()
            .withf(|combo| combo.key == "c")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        keys.expect_press_and_release()
            .withf(|combo| combo.key == "f1")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let mut router = router(
            "SimICPStpt 0 0 0x2E 4\nSimICPCom1 0 0 0x3b 0",
            &[("ICP_BTN_6 1", "SimICPStpt"), ("ICP_COM1 1", "SimICPCom1")],
            keys,
            MockAxisSink::new(),
        );

        router.route("ICP_BTN_6 1").await.unwrap();
        router.route("ICP_COM1 1").await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_alias_suppressed() {
        let mut keys = MockKeySink::new();
        keys.expect_press_and_release().never();
        let mut axis_sink = MockAxisSink::new();
        axis_sink.expect_set_axis().never();

        let mut router = router("", &[("ICP_BTN_6 0", "")], keys, axis_sink);

        assert_eq!(
            router.route("ICP_BTN_6 0").await.unwrap(),
            RouteOutcome::Suppressed
        );
    }

    #[tokio::test]
    async fn test_alias_to_unbound_action() {
        let mut keys = MockKeySink::new();
        keys.expect_press_and_release().never();

        let mut router = router(
            "",
            &[("ICP_BTN_6 1", "SimICPStpt")],
            keys,
            MockAxisSink::new(),
        );

        assert_eq!(
            router.route("ICP_BTN_6 1").await.unwrap(),
            RouteOutcome::UnknownAction("SimICPStpt".to_string())
        );
    }

    #[tokio::test]
    async fn test_key_sink_error_propagates() {
        let mut keys = MockKeySink::new();
        keys.expect_press_and_release()
            .returning(|_| Err(BridgeError::Injection("uinput gone".to_string())));

        let mut router = router(
            "TEST_ACTION 0 0 0x1e 2",
            &[("TEST_ACTION 1", "TEST_ACTION")],
            keys,
            MockAxisSink::new(),
        );

        let err = router.route("TEST_ACTION 1").await.unwrap_err();
        assert!(err.is_soft());
    }

    #[tokio::test(start_paused = true)]
    async fn test_key_press_holds_before_returning() {
        let mut keys = MockKeySink::new();
        keys.expect_press_and_release().times(1).returning(|_| Ok(()));
        let mut axis_sink = MockAxisSink::new();
        axis_sink.expect_set_axis().times(1).returning(|_, _| Ok(()));

        let mut router = CommandRouter::new(
            parse_keymap("TEST_ACTION 0 0 0x1e 2"),
            aliases(&[("TEST_ACTION 1", "TEST_ACTION")]),
            HashMap::from([("ICP_HUD_BRT_KNB".to_string(), Axis::X)]),
            Box::new(keys),
            Box::new(axis_sink),
        );

        let start = tokio::time::Instant::now();
        router.route("TEST_ACTION 1").await.unwrap();
        assert!(start.elapsed() >= KEY_HOLD);

        let start = tokio::time::Instant::now();
        router.route("ICP_HUD_BRT_KNB 100").await.unwrap();
        router.route("UNKNOWN_TOKEN 5").await.unwrap();
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    // ==================== Axes ====================

    #[tokio::test]
    async fn test_axis_token_scaled() {
        let mut keys = MockKeySink::new();
        keys.expect_press_and_release().never();
        let mut axis_sink = MockAxisSink::new();
        axis_sink
            .expect_set_axis()
            .with(eq(Axis::X), eq(32768u32))
            .times(1)
            .returning(|_, _| Ok(()));

        let mut router = router("", &[], keys, axis_sink);

        assert_eq!(
            router.route("ICP_HUD_BRT_KNB 65534").await.unwrap(),
            RouteOutcome::Axis {
                axis: Axis::X,
                value: 32768
            }
        );
    }

    #[tokio::test]
    async fn test_axis_value_not_integer() {
        let mut axis_sink = MockAxisSink::new();
        axis_sink.expect_set_axis().never();

        let mut router = router("", &[], MockKeySink::new(), axis_sink);

        assert_eq!(
            router.route("ICP_HUD_BRT_KNB high").await.unwrap(),
            RouteOutcome::NotFound
        );
    }

    // ==================== Not Found ====================

    #[tokio::test]
    async fn test_unknown_token_touches_no_sink() {
        let mut keys = MockKeySink::new();
        keys.expect_press_and_release().never();
        let mut axis_sink = MockAxisSink::new();
        axis_sink.expect_set_axis().never();

        let mut router = router("TEST_ACTION 0 0 0x1e 2", &[], keys, axis_sink);

        assert_eq!(
            router.route("UNKNOWN_TOKEN 5").await.unwrap(),
            RouteOutcome::NotFound
        );
    }

    #[tokio::test]
    async fn test_handle_delegates_to_route() {
        let mut keys = MockKeySink::new();
        keys.expect_press_and_release().times(1).returning(|_| Ok(()));

        let mut router = router(
            "TEST_ACTION 0 0 0x1e 2",
            &[("TEST_ACTION 1", "TEST_ACTION")],
            keys,
            MockAxisSink::new(),
        );

        tokio_test::assert_ok!(router.handle("TEST_ACTION 1").await);
        tokio_test::assert_ok!(router.handle("UNKNOWN_TOKEN 5").await);
    }

    #[tokio::test]
    async fn test_from_config_missing_keyfile() {
        let config = KeymapConfig {
            path: "/nonexistent/keyfile.txt".into(),
            ..Default::default()
        };
        let result =
            CommandRouter::from_config(&config, Box::new(MockKeySink::new()), Box::new(MockAxisSink::new()));
        assert!(matches!(result, Err(BridgeError::Keymap { .. })));
    }
}
