use std::future::Future;
use std::time::Duration;

// runtime-async-std
#[cfg(all(feature = "runtime-async-std", not(feature = "runtime-tokio")))]
pub use async_std::task::yield_now;

#[cfg(all(feature = "runtime-async-std", not(feature = "runtime-tokio")))]
pub fn spawn<F>(future: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    // dropping the handle detaches the task
    let _ = async_std::task::spawn(future);
}

#[cfg(all(feature = "runtime-async-std", not(feature = "runtime-tokio")))]
pub async fn sleep(duration: Duration) {
    async_std::task::sleep(duration).await
}

// runtime-tokio
#[cfg(feature = "runtime-tokio")]
pub use tokio::task::yield_now;

#[cfg(feature = "runtime-tokio")]
pub fn spawn<F>(future: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    let _ = tokio::spawn(future);
}

#[cfg(feature = "runtime-tokio")]
pub async fn sleep(duration: Duration) {
    tokio::time::sleep(duration).await
}
