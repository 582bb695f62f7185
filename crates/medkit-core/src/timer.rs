use futures::future::{self, Either};
use std::{future::Future, pin::pin, time::Duration};

#[cfg(not(target_arch = "wasm32"))]
pub async fn sleep(duration: Duration) {
    tokio::time::sleep(duration).await
}

#[cfg(target_arch = "wasm32")]
pub async fn sleep(duration: Duration) {
    gloo_timers::future::sleep(duration).await
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
#[error("deadline of {0:?} elapsed")]
pub struct Elapsed(pub Duration);

/// Races `fut` against a timer, dropping it if the timer wins
pub async fn timeout<F: Future>(duration: Duration, fut: F) -> Result<F::Output, Elapsed> {
    match future::select(pin!(fut), pin!(sleep(duration))).await {
        Either::Left((res, _)) => Ok(res),
        Either::Right(((), _)) => Err(Elapsed(duration)),
    }
}
