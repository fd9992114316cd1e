//! Expression-based filtering of collections, maps, and streams
//!
//! The filter expression sees each element as `filterObject`; map entries
//! are presented as `{key, value}` views. Filtering preserves the container
//! variant, and stream filtering is lazy: elements are tested as the
//! consumer pulls them, and closing the filtered view early propagates the
//! close signal to the upstream stream.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{json, Value};

use crate::error::Result;
use crate::expr::{CompiledExpression, EvalContext, ExprError};
use crate::resource::{Argument, Payload, StreamItem, ValueStream};

pub(crate) const FILTER_OBJECT: &str = "filterObject";

/// Narrow a payload to the elements the expression retains
pub(crate) fn filter_payload(
    payload: Payload,
    expression: &Arc<dyn CompiledExpression>,
    base: &EvalContext,
) -> Result<Payload> {
    match payload {
        Payload::List(items) => {
            let mut kept = Vec::with_capacity(items.len());
            for item in items {
                if retains(expression, base, item.clone())? {
                    kept.push(item);
                }
            }
            Ok(Payload::List(kept))
        }
        Payload::Map(map) => {
            let mut kept = BTreeMap::new();
            for (key, value) in map {
                let entry = json!({ "key": key, "value": value });
                if retains(expression, base, entry)? {
                    kept.insert(key, value);
                }
            }
            Ok(Payload::Map(kept))
        }
        Payload::Stream(stream) => Ok(Payload::Stream(filter_stream(
            stream,
            expression.clone(),
            base.clone(),
        ))),
        Payload::Unit | Payload::Scalar(_) => Err(ExprError::InvalidFilterTarget(
            "only collections, maps, and streams can be filtered".to_string(),
        )
        .into()),
    }
}

/// Pick the argument a pre-filter narrows: the named target when given,
/// otherwise the unique filterable argument
pub(crate) fn select_filter_target(
    arguments: &[Argument],
    explicit: Option<&str>,
) -> Result<usize> {
    if let Some(name) = explicit {
        let position = arguments.iter().position(|a| a.name == name);
        return match position {
            Some(index) if arguments[index].value.is_filterable() => Ok(index),
            Some(_) => Err(ExprError::InvalidFilterTarget(format!(
                "argument '{}' is not a collection, map, or stream",
                name
            ))
            .into()),
            None => {
                Err(ExprError::InvalidFilterTarget(format!("no argument named '{}'", name)).into())
            }
        };
    }

    let mut filterable = arguments
        .iter()
        .enumerate()
        .filter(|(_, a)| a.value.is_filterable());
    match (filterable.next(), filterable.next()) {
        (Some((index, _)), None) => Ok(index),
        (None, _) => Err(ExprError::InvalidFilterTarget(
            "no filterable argument present".to_string(),
        )
        .into()),
        (Some(_), Some(_)) => Err(ExprError::InvalidFilterTarget(
            "several filterable arguments; name the target explicitly".to_string(),
        )
        .into()),
    }
}

fn retains(
    expression: &Arc<dyn CompiledExpression>,
    base: &EvalContext,
    item: Value,
) -> Result<bool> {
    let ctx = base.clone().with_variable(FILTER_OBJECT, item);
    Ok(expression.evaluate_bool(&ctx)?)
}

fn filter_stream(
    upstream: ValueStream,
    expression: Arc<dyn CompiledExpression>,
    base: EvalContext,
) -> ValueStream {
    struct FilterIter {
        // owning the upstream stream chains the early-close signal: when
        // the filtered view is dropped unexhausted, so is the upstream
        upstream: ValueStream,
        expression: Arc<dyn CompiledExpression>,
        base: EvalContext,
        failed: bool,
    }

    impl Iterator for FilterIter {
        type Item = StreamItem;

        fn next(&mut self) -> Option<Self::Item> {
            if self.failed {
                return None;
            }
            loop {
                match self.upstream.next() {
                    None => return None,
                    Some(Err(err)) => return Some(Err(err)),
                    Some(Ok(item)) => {
                        let ctx = self.base.clone().with_variable(FILTER_OBJECT, item.clone());
                        match self.expression.evaluate_bool(&ctx) {
                            Ok(true) => return Some(Ok(item)),
                            Ok(false) => continue,
                            Err(err) => {
                                self.failed = true;
                                return Some(Err(err.into()));
                            }
                        }
                    }
                }
            }
        }
    }

    ValueStream::from_results(FilterIter {
        upstream,
        expression,
        base,
        failed: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{CelCompiler, ExpressionCompiler};
    use std::sync::atomic::{AtomicBool, Ordering};

    fn compiled(source: &str) -> Arc<dyn CompiledExpression> {
        CelCompiler::new().compile(source).unwrap()
    }

    #[test]
    fn test_list_filter_preserves_order_and_type() {
        let expression = compiled("filterObject == 'bob'");
        let payload = Payload::List(vec![json!("bob"), json!("joe"), json!("sam")]);

        let filtered = filter_payload(payload, &expression, &EvalContext::new()).unwrap();
        assert_eq!(filtered, Payload::List(vec![json!("bob")]));
    }

    #[test]
    fn test_map_filter_by_key() {
        let expression = compiled("filterObject.key == 'key2'");
        let mut map = BTreeMap::new();
        map.insert("key1".to_string(), json!("v1"));
        map.insert("key2".to_string(), json!("v2"));

        let filtered =
            filter_payload(Payload::Map(map), &expression, &EvalContext::new()).unwrap();
        let mut expected = BTreeMap::new();
        expected.insert("key2".to_string(), json!("v2"));
        assert_eq!(filtered, Payload::Map(expected));
    }

    #[test]
    fn test_stream_filter_is_lazy() {
        let expression = compiled("filterObject != 'joe'");
        let stream = ValueStream::from_values(vec![json!("bob"), json!("joe"), json!("sam")]);

        let filtered =
            filter_payload(Payload::Stream(stream), &expression, &EvalContext::new()).unwrap();
        let Payload::Stream(filtered) = filtered else {
            panic!("stream filtering must produce a stream");
        };
        assert_eq!(
            filtered.into_values().unwrap(),
            vec![json!("bob"), json!("sam")]
        );
    }

    #[test]
    fn test_stream_early_close_propagates_upstream() {
        static CLOSED: AtomicBool = AtomicBool::new(false);

        let expression = compiled("true");
        let stream = ValueStream::from_values(vec![json!(1), json!(2), json!(3)])
            .with_close_hook(|| CLOSED.store(true, Ordering::SeqCst));

        let filtered =
            filter_payload(Payload::Stream(stream), &expression, &EvalContext::new()).unwrap();
        let Payload::Stream(mut filtered) = filtered else {
            panic!("stream filtering must produce a stream");
        };
        let first = filtered.next();
        assert!(matches!(first, Some(Ok(v)) if v == json!(1)));

        drop(filtered);
        assert!(CLOSED.load(Ordering::SeqCst));
    }

    #[test]
    fn test_scalar_target_is_a_fault() {
        let expression = compiled("true");
        let result = filter_payload(
            Payload::Scalar(json!(1)),
            &expression,
            &EvalContext::new(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_select_named_target() {
        let arguments = vec![
            Argument::new("limit", Payload::Scalar(json!(10))),
            Argument::new("names", Payload::List(vec![json!("bob")])),
        ];
        assert_eq!(select_filter_target(&arguments, Some("names")).unwrap(), 1);
        assert!(select_filter_target(&arguments, Some("limit")).is_err());
        assert!(select_filter_target(&arguments, Some("missing")).is_err());
    }

    #[test]
    fn test_select_sole_filterable_target() {
        let arguments = vec![
            Argument::new("limit", Payload::Scalar(json!(10))),
            Argument::new("names", Payload::List(vec![json!("bob")])),
        ];
        assert_eq!(select_filter_target(&arguments, None).unwrap(), 1);

        let ambiguous = vec![
            Argument::new("a", Payload::List(vec![])),
            Argument::new("b", Payload::List(vec![])),
        ];
        assert!(select_filter_target(&ambiguous, None).is_err());

        let none = vec![Argument::new("limit", Payload::Scalar(json!(10)))];
        assert!(select_filter_target(&none, None).is_err());
    }
}
