//! Hook resolution: the timed bite checks that run after a cast
//!
//! Each cast gets its own task. Rounds run once per interval, starting
//! immediately, and each round takes the coordinator lock only for as long
//! as the bite check itself. The sleeps in between never hold the lock.
//!
//! A supervising wrapper awaits the worker so that a panic inside a round is
//! turned into the same cleanup path as a returned error instead of leaving
//! the player stuck with a line out.

use crate::fishing::{FishingCoordinator, HookRound};
use fishing_shared::ConnectionId;
use log::{debug, error, info};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Spawns the supervised resolution task for attempt `generation`
pub fn spawn_hook_resolution(
    state: Arc<Mutex<FishingCoordinator>>,
    client_id: ConnectionId,
    generation: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let worker = tokio::spawn(run_hook_resolution(Arc::clone(&state), client_id, generation));

        if let Err(e) = worker.await {
            error!(
                "Hook resolution for {} (attempt {}) failed: {}",
                client_id, generation, e
            );
            state.lock().await.abort_attempt(client_id, generation);
        }
    })
}

/// Runs the bite checks for one attempt until it hooks, goes stale, fails
/// or runs out of rounds
pub async fn run_hook_resolution(
    state: Arc<Mutex<FishingCoordinator>>,
    client_id: ConnectionId,
    generation: u64,
) {
    let (max_rounds, interval) = {
        let coordinator = state.lock().await;
        let rules = coordinator.rules();
        (rules.max_rounds, rules.round_interval)
    };
    info!(
        "Starting hook checks for {} (attempt {}, {} rounds)",
        client_id, generation, max_rounds
    );

    for round in 0..max_rounds {
        let outcome = state.lock().await.hook_round(client_id, generation, round);

        match outcome {
            Ok(HookRound::Stale) => {
                info!(
                    "Fishing attempt for {} was cancelled or replaced, stopping hook checks.",
                    client_id
                );
                return;
            }
            Ok(HookRound::Hooked(_)) => return,
            Ok(HookRound::NoFishNearby) | Ok(HookRound::Missed { .. }) => {}
            Err(e) => {
                error!("Error during hook checks for {}: {}", client_id, e);
                state.lock().await.abort_attempt(client_id, generation);
                return;
            }
        }

        tokio::time::sleep(interval).await;
    }

    debug!("Hook checks exhausted for {} (attempt {})", client_id, generation);
    state.lock().await.expire_attempt(client_id, generation);
}
