// Fire-and-observe subscriptions.
// Appends successful outcomes to a shared list without blocking the caller.

use std::fmt::Debug;

use crate::downstream::SharedList;

use super::Computation;

/// Start `computation` and append its payload to `list` when it succeeds.
///
/// Returns immediately. The append happens on a worker thread whenever the
/// run completes, which may be after the caller has already handed `list`
/// on. Failures are logged and dropped.
pub fn observe_into<C>(computation: &C, list: &SharedList<C::Output>, label: &'static str)
where
    C: Computation,
    C::Output: Debug,
{
    let list = list.clone();
    computation.subscribe(move |outcome| match outcome {
        Ok(value) => {
            tracing::info!(observer = label, ?value, "observer received value");
            list.push(value.clone());
        }
        Err(err) => {
            tracing::warn!(observer = label, error = %err, "observer received failure");
        }
    });
}
