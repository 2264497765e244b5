/*!
 * Chain execution.
 *
 * A chain runs its steps in order and stops at the first failure. Steps
 * that already ran are not undone.
 */
use tracing::{debug, info, warn};

use crate::action::dispatch_spec;
use crate::error::ChainError;
use crate::registry::Registry;

/// Run the chain called `name`
pub async fn run(registry: &mut Registry, name: &str) -> Result<(), ChainError> {
    let steps = registry
        .chain(name)
        .map(|c| c.steps.clone())
        .ok_or_else(|| ChainError::UnknownChain(name.to_string()))?;

    info!(chain = name, steps = steps.len(), "Running chain");
    for (step, spec) in steps.iter().enumerate() {
        debug!(chain = name, step, device = %spec.device, action = %spec.action, "Chain step");
        if let Err(source) = dispatch_spec(&mut registry.devices, spec).await {
            warn!(chain = name, step, error = %source, "Chain stopped");
            return Err(ChainError::Step {
                chain: name.to_string(),
                step,
                source,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use breadboard_devices::{FactoryTable, SimulatedBoard};
    use serde_json::json;

    use crate::document::Document;
    use crate::error::DispatchError;

    fn registry(board: &SimulatedBoard) -> Registry {
        let document = Document::from_json(&json!({
            "porch": {"device": "VirtualToggleButton", "pin": 3},
            "hall": {"device": "VirtualToggleButton", "pin": 4},
            "chains": {
                "evening": [
                    {"device": "porch", "action": "on"},
                    {"device": "hall", "action": "on"},
                ],
                "broken": [
                    {"device": "porch", "action": "on"},
                    {"device": "hall", "action": "on", "brightness": 10},
                    {"device": "porch", "action": "off"},
                ],
                "idle": [],
            }
        }))
        .unwrap();
        Registry::build(&document, &FactoryTable::standard(), board).unwrap()
    }

    #[tokio::test]
    async fn test_chain_runs_steps_in_order() {
        let board = SimulatedBoard::new();
        let mut registry = registry(&board);

        run(&mut registry, "evening").await.unwrap();
        assert_eq!(board.level(3), Some(true));
        assert_eq!(board.level(4), Some(true));
    }

    #[tokio::test]
    async fn test_chain_stops_at_first_failure() {
        let board = SimulatedBoard::new();
        let mut registry = registry(&board);

        let err = run(&mut registry, "broken").await.unwrap_err();
        match err {
            ChainError::Step { chain, step, source } => {
                assert_eq!(chain, "broken");
                assert_eq!(step, 1);
                assert!(matches!(source, DispatchError::Action { ref device, .. } if device == "hall"));
            }
            other => panic!("expected a step failure, got {:?}", other),
        }
        // The first step ran and the third never did
        assert_eq!(board.level(3), Some(true));
        assert_eq!(board.level(4), Some(false));
    }

    #[tokio::test]
    async fn test_empty_and_unknown_chains() {
        let board = SimulatedBoard::new();
        let mut registry = registry(&board);

        tokio_test::assert_ok!(run(&mut registry, "idle").await);
        assert_eq!(
            run(&mut registry, "party").await.unwrap_err(),
            ChainError::UnknownChain("party".into())
        );
    }
}
