//! Lifecycle hooks run around `save` and `remove`.
//!
//! Hooks are asynchronous callables over the record being written. Three adapters cover the
//! usual declaration styles:
//!
//! - [`from_fn`] - a plain synchronous closure
//! - [`from_async`] - a closure returning a future that resolves to the (possibly changed) data
//! - [`from_callback`] - a closure that reports completion through a callback
//!
//! A failing hook aborts the rest of the chain and the write it guards.

use std::{fmt, future::Future, str::FromStr, sync::Arc};

use async_trait::async_trait;
use bson::Document;
use futures::channel::oneshot;

use crate::{
    error::{StoreError, StoreResult},
    record::Record,
};

/// Write operations hooks can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookType {
    Save,
    Remove,
}

impl FromStr for HookType {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "save" => Ok(HookType::Save),
            "remove" => Ok(HookType::Remove),
            other => Err(StoreError::InvalidHook(format!(
                "Hook type must be `save` or `remove`, got `{other}`"
            ))),
        }
    }
}

impl fmt::Display for HookType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookType::Save => f.write_str("save"),
            HookType::Remove => f.write_str("remove"),
        }
    }
}

/// Whether a hook runs before or after the write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPhase {
    Pre,
    Post,
}

/// An asynchronous lifecycle hook.
#[async_trait]
pub trait Hook: Send + Sync {
    async fn call(&self, record: &mut dyn Record) -> StoreResult<()>;
}

/// Completion callback handed to [`from_callback`] hooks.
pub type Callback = Box<dyn FnOnce(StoreResult<Document>) + Send>;

struct FnHook<F>(F);

#[async_trait]
impl<F> Hook for FnHook<F>
where
    F: Fn(&mut dyn Record) -> StoreResult<()> + Send + Sync,
{
    async fn call(&self, record: &mut dyn Record) -> StoreResult<()> {
        (self.0)(record)
    }
}

struct AsyncHook<F>(F);

#[async_trait]
impl<F, Fut> Hook for AsyncHook<F>
where
    F: Fn(Document) -> Fut + Send + Sync,
    Fut: Future<Output = StoreResult<Document>> + Send,
{
    async fn call(&self, record: &mut dyn Record) -> StoreResult<()> {
        let data = (self.0)(record.data().clone()).await?;
        *record.data_mut() = data;
        Ok(())
    }
}

struct CallbackHook<F>(F);

#[async_trait]
impl<F> Hook for CallbackHook<F>
where
    F: Fn(Document, Callback) + Send + Sync,
{
    async fn call(&self, record: &mut dyn Record) -> StoreResult<()> {
        let (sender, receiver) = oneshot::channel();
        let done: Callback = Box::new(move |result| {
            let _ = sender.send(result);
        });

        (self.0)(record.data().clone(), done);

        let data = receiver
            .await
            .map_err(|_| StoreError::Hook("hook dropped its callback without completing".into()))??;
        *record.data_mut() = data;
        Ok(())
    }
}

/// Wraps a synchronous closure.
///
/// # Example
///
/// ```ignore
/// schema.pre("save", hook::from_fn(|record| {
///     record.data_mut().insert("updated", bson::DateTime::now());
///     Ok(())
/// }))?;
/// ```
pub fn from_fn<F>(hook: F) -> Arc<dyn Hook>
where
    F: Fn(&mut dyn Record) -> StoreResult<()> + Send + Sync + 'static,
{
    Arc::new(FnHook(hook))
}

/// Wraps a closure returning a future. The resolved document replaces the record's data.
pub fn from_async<F, Fut>(hook: F) -> Arc<dyn Hook>
where
    F: Fn(Document) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = StoreResult<Document>> + Send + 'static,
{
    Arc::new(AsyncHook(hook))
}

/// Wraps a completion-callback closure. The document passed to the callback replaces the
/// record's data; an error passed to it fails the hook.
pub fn from_callback<F>(hook: F) -> Arc<dyn Hook>
where
    F: Fn(Document, Callback) + Send + Sync + 'static,
{
    Arc::new(CallbackHook(hook))
}

/// Runs `hooks` in order against `record`, stopping at the first failure.
pub async fn run_all(hooks: &[Arc<dyn Hook>], record: &mut dyn Record) -> StoreResult<()> {
    for hook in hooks {
        hook.call(record).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use pretty_assertions::assert_eq;

    #[test]
    fn hook_types_are_validated() {
        assert_eq!("save".parse::<HookType>().unwrap(), HookType::Save);
        assert_eq!("remove".parse::<HookType>().unwrap(), HookType::Remove);
        assert!(matches!("update".parse::<HookType>(), Err(StoreError::InvalidHook(_))));
    }

    #[tokio::test]
    async fn adapters_share_one_calling_convention() {
        let hooks = vec![
            from_fn(|record| {
                record.data_mut().insert("sync", true);
                Ok(())
            }),
            from_async(|mut data| async move {
                data.insert("async", true);
                Ok(data)
            }),
            from_callback(|mut data, done| {
                data.insert("callback", true);
                done(Ok(data));
            }),
        ];

        let mut data = doc! {};
        run_all(&hooks, &mut data).await.unwrap();
        assert_eq!(data, doc! { "sync": true, "async": true, "callback": true });
    }

    #[tokio::test]
    async fn failure_stops_the_chain() {
        let hooks = vec![
            from_callback(|_, done| done(Err(StoreError::Hook("rejected".into())))),
            from_fn(|record| {
                record.data_mut().insert("reached", true);
                Ok(())
            }),
        ];

        let mut data = doc! {};
        let err = run_all(&hooks, &mut data).await.unwrap_err();
        assert!(matches!(err, StoreError::Hook(ref message) if message == "rejected"));
        assert!(data.is_empty());
    }

    #[tokio::test]
    async fn dropped_callback_is_an_error() {
        let hooks = vec![from_callback(|_, done| drop(done))];
        let mut data = doc! {};
        assert!(run_all(&hooks, &mut data).await.is_err());
    }
}
