use std::future::Future;
use tokio_util::sync::CancellationToken;

use crate::error::{ApiError, ApiResult};

/// Scope tied to a view's lifetime. Work started through [`Lifetime::run`]
/// resolves to [`ApiError::Cancelled`] once the scope ends, so a torn-down
/// view never receives late results. Dropping the scope ends it.
#[derive(Debug, Default)]
pub struct Lifetime {
    token: CancellationToken,
}

impl Lifetime {
    pub fn new() -> Self {
        Self::default()
    }

    /// A child scope ending with this one or on its own.
    pub fn child(&self) -> Lifetime {
        Lifetime { token: self.token.child_token() }
    }

    pub fn end(&self) {
        self.token.cancel();
    }

    pub fn is_ended(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub async fn run<T, F>(&self, fut: F) -> ApiResult<T>
    where
        F: Future<Output = ApiResult<T>>,
    {
        scoped(self.token.clone(), fut).await
    }
}

impl Drop for Lifetime {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Like [`Lifetime::run`] for tasks that only hold a token.
pub async fn scoped<T, F>(token: CancellationToken, fut: F) -> ApiResult<T>
where
    F: Future<Output = ApiResult<T>>,
{
    if token.is_cancelled() {
        return Err(ApiError::Cancelled);
    }
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(ApiError::Cancelled),
        res = fut => res,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn completes_when_alive() {
        let life = Lifetime::new();
        let v = life.run(async { Ok::<_, ApiError>(7) }).await.unwrap();
        assert_eq!(v, 7);
    }

    #[tokio::test]
    async fn ending_the_scope_discards_result() {
        let life = Lifetime::new();
        let token = life.token();
        let slow = tokio::spawn(scoped(token, async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok::<_, ApiError>(1)
        }));
        life.end();
        let res = slow.await.unwrap();
        assert!(matches!(res, Err(ApiError::Cancelled)));
    }

    #[tokio::test]
    async fn dropping_parent_ends_child() {
        let parent = Lifetime::new();
        let child = parent.child();
        drop(parent);
        assert!(child.is_ended());
        let res = child.run(async { Ok::<_, ApiError>(()) }).await;
        assert!(matches!(res, Err(ApiError::Cancelled)));
    }
}
