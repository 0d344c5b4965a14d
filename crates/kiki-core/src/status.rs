//! Rotating status text for pending requests.

use std::future::Future;
use std::time::Duration;

use tokio::time::MissedTickBehavior;

/// Drive `fut` to completion while cycling through `messages`.
///
/// The first message is emitted immediately, then one message every `period`
/// until the future resolves. Cycling wraps around. An empty message list
/// just awaits the future.
pub async fn with_rotating_status<F, T, E>(
    fut: F,
    messages: &[String],
    period: Duration,
    mut emit: E,
) -> T
where
    F: Future<Output = T>,
    E: FnMut(&str),
{
    tokio::pin!(fut);

    if messages.is_empty() || period.is_zero() {
        return fut.await;
    }

    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut index = 0usize;

    loop {
        tokio::select! {
            biased;
            _ = ticker.tick() => {
                emit(&messages[index % messages.len()]);
                index += 1;
            }
            out = &mut fut => return out,
        }
    }
}
