use atomic_value::AtomicCell;
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Operation {
    Load,
    Store(u8),
    Swap(u8),
    CompareAndSwap(u8, u8),
    CompareExchange(Option<u8>, u8),
}

fn operation() -> impl Strategy<Value = Operation> {
    // A narrow value range makes successful compare-and-swaps common.
    let val = || 0u8..4;
    prop_oneof![
        Just(Operation::Load),
        val().prop_map(Operation::Store),
        val().prop_map(Operation::Swap),
        (val(), val()).prop_map(|(c, n)| Operation::CompareAndSwap(c, n)),
        (proptest::option::of(val()), val()).prop_map(|(c, n)| Operation::CompareExchange(c, n)),
    ]
}

proptest! {
    #[test]
    fn test_cell_matches_sequential_model(
        initial in proptest::option::of(0u8..4),
        ops in proptest::collection::vec(operation(), 1..64),
    ) {
        let cell = initial.map_or_else(AtomicCell::empty, AtomicCell::new);
        let mut model = initial;

        for op in ops {
            match op {
                Operation::Load => {
                    prop_assert_eq!(cell.load(), model.unwrap_or_default());
                }
                Operation::Store(v) => {
                    cell.store(v);
                    model = Some(v);
                }
                Operation::Swap(v) => {
                    prop_assert_eq!(cell.swap(v), model.unwrap_or_default());
                    model = Some(v);
                }
                Operation::CompareAndSwap(current, new) => {
                    let expected = model.unwrap_or_default() == current;
                    prop_assert_eq!(cell.compare_and_swap(&current, new), expected);
                    if expected {
                        model = Some(new);
                    }
                }
                Operation::CompareExchange(current, new) => {
                    let result = cell.compare_exchange(current.as_ref(), new);
                    if model == current {
                        prop_assert_eq!(result, Ok(()));
                        model = Some(new);
                    } else {
                        prop_assert_eq!(result, Err(model));
                    }
                }
            }
            prop_assert_eq!(cell.load_opt(), model);
            prop_assert_eq!(cell.is_empty(), model.is_none());
        }
    }
}
