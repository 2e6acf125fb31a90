//! Algebraic laws every reducer must satisfy: associativity and identity.

use flowgraph::{Append, Counter, DictMerge, Overwrite, Reducer, Telemetry, UsageRow};
use proptest::prelude::*;

fn merged<R: Reducer + Clone>(a: &R, b: &R) -> R {
    let mut out = a.clone();
    out.reduce(b.clone());
    out
}

fn assert_laws<R>(a: R, b: R, c: R)
where
    R: Reducer + Clone + Default + PartialEq + std::fmt::Debug,
{
    let left = merged(&merged(&a, &b), &c);
    let right = merged(&a, &merged(&b, &c));
    assert_eq!(left, right, "associativity");

    assert_eq!(merged(&a, &R::default()), a, "right identity");
    assert_eq!(merged(&R::default(), &a), a, "left identity");
    assert!(R::default().is_identity());
}

fn overwrite() -> impl Strategy<Value = Overwrite<String>> {
    prop::option::of("[a-z]{0,6}").prop_map(|v| match v {
        Some(v) => Overwrite::new(v),
        None => Overwrite::unset(),
    })
}

fn append() -> impl Strategy<Value = Append<u8>> {
    prop::collection::vec(any::<u8>(), 0..6).prop_map(Append::new)
}

fn dict() -> impl Strategy<Value = DictMerge<String, i32>> {
    prop::collection::vec(("[a-d]", any::<i32>()), 0..6)
        .prop_map(|pairs| pairs.into_iter().collect())
}

fn counter() -> impl Strategy<Value = Counter> {
    (0u32..50).prop_map(Counter::new)
}

fn telemetry() -> impl Strategy<Value = Telemetry> {
    prop::collection::vec(("(classify|retrieve|rerank)", 0u32..500, 0u32..500), 0..4).prop_map(
        |rows| {
            let mut telemetry = Telemetry::default();
            for (stage, input, output) in rows {
                telemetry.reduce(Telemetry::row(stage, UsageRow::new(input, output, 0.5)));
            }
            telemetry
        },
    )
}

proptest! {
    #[test]
    fn overwrite_laws(a in overwrite(), b in overwrite(), c in overwrite()) {
        assert_laws(a, b, c);
    }

    #[test]
    fn append_laws(a in append(), b in append(), c in append()) {
        assert_laws(a, b, c);
    }

    #[test]
    fn dict_merge_laws(a in dict(), b in dict(), c in dict()) {
        assert_laws(a, b, c);
    }

    #[test]
    fn counter_laws(a in counter(), b in counter(), c in counter()) {
        assert_laws(a, b, c);
    }

    #[test]
    fn telemetry_laws(a in telemetry(), b in telemetry(), c in telemetry()) {
        assert_laws(a, b, c);
    }

    #[test]
    fn telemetry_totals_are_additive(a in telemetry(), b in telemetry()) {
        let both = merged(&a, &b);
        prop_assert_eq!(both.total_input_tokens(), a.total_input_tokens() + b.total_input_tokens());
        prop_assert_eq!(both.total_output_tokens(), a.total_output_tokens() + b.total_output_tokens());
    }
}
