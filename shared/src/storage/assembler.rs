//! Groups decoded spans into traces.

use crate::models::{Span, Trace, TraceId};
use std::collections::hash_map::Entry;
use std::collections::HashMap;

/// Groups `spans` by trace ID and returns the traces in `requested` order.
///
/// Spans keep their scan order within a trace. Requested IDs with no spans
/// are omitted, as are spans whose trace was not requested, so every
/// returned trace has at least one span. A requested ID listed twice yields
/// its trace once, at the first position.
///
/// # Example
///
/// ```
/// use shared::models::{Span, SpanId, TraceId};
/// use shared::storage::assemble;
///
/// let a = TraceId::new(0, 1);
/// let b = TraceId::new(0, 2);
/// let spans = vec![
///     Span::new(a, SpanId(1), "op", "api"),
///     Span::new(b, SpanId(2), "op", "api"),
/// ];
///
/// let traces = assemble(&[b, TraceId::new(0, 9), a], spans);
///
/// assert_eq!(traces.len(), 2);
/// assert_eq!(traces[0].trace_id(), Some(b));
/// assert_eq!(traces[1].trace_id(), Some(a));
/// ```
#[must_use]
pub fn assemble<I>(requested: &[TraceId], spans: I) -> Vec<Trace>
where
    I: IntoIterator<Item = Span>,
{
    let mut grouped: HashMap<TraceId, Trace> = HashMap::with_capacity(requested.len());

    for span in spans {
        match grouped.entry(span.trace_id) {
            Entry::Occupied(mut entry) => entry.get_mut().push(span),
            Entry::Vacant(entry) => {
                entry.insert(Trace::from_span(span));
            }
        }
    }

    requested
        .iter()
        .filter_map(|trace_id| grouped.remove(trace_id))
        .collect()
}
