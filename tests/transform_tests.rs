use std::cell::Cell;
use std::rc::Rc;

use asynciter::{
    from_array, multi_transform, range, transform_with, wrap, AsyncIterator, IterError,
    ManualScheduler, SimpleTransformOptions, SourceExpr, TransformOptions,
};
use futures_util::FutureExt;

fn setup() -> Rc<ManualScheduler> {
    let scheduler = ManualScheduler::new();
    scheduler.install();
    scheduler
}

fn collect<T: Clone + 'static>(scheduler: &ManualScheduler, it: &AsyncIterator<T>) -> Vec<T> {
    let future = it.to_vec();
    scheduler.drain();
    future
        .now_or_never()
        .expect("iterator did not finish")
        .expect("iterator errored")
}

#[test]
fn test_map() {
    let scheduler = setup();
    let it = from_array(vec![1, 2, 3]).map(|x| x * 2);
    assert_eq!(collect(&scheduler, &it), vec![2, 4, 6]);
}

#[test]
fn test_filter() {
    let scheduler = setup();
    let it = from_array(vec![1, 2, 3, 4, 5, 6]).filter(|x| x % 2 == 0);
    assert_eq!(collect(&scheduler, &it), vec![2, 4, 6]);
}

#[test]
fn test_filter_map_skips_none() {
    let scheduler = setup();
    let it = from_array(vec![1, 2, 3, 4]).filter_map(|x| (x % 2 == 1).then_some(x * 10));
    assert_eq!(collect(&scheduler, &it), vec![10, 30]);
}

#[test]
fn test_uniq() {
    let scheduler = setup();
    let it = from_array(vec![1, 2, 1, 3, 2, 4]).uniq();
    assert_eq!(collect(&scheduler, &it), vec![1, 2, 3, 4]);
}

#[test]
fn test_uniq_by_key() {
    let scheduler = setup();
    let it = from_array(vec!["alpha", "apple", "bear", "bliss", "cedar"])
        .uniq_by(|word| word.as_bytes()[0]);
    assert_eq!(collect(&scheduler, &it), vec!["alpha", "bear", "cedar"]);
}

#[test]
fn test_map_closes_when_source_already_done() {
    let scheduler = setup();
    let source = from_array(Vec::<i32>::new());
    scheduler.drain();
    assert!(source.done());
    let it = source.map(|x| x);
    assert!(it.closed());
    scheduler.drain();
    assert!(it.done());
}

#[test]
fn test_skip_take_slice_law() {
    let scheduler = setup();
    let items = vec![0, 1, 2, 3, 4, 5, 6, 7, 8, 9];
    let it = from_array(items.clone()).skip(2).take(3);
    assert_eq!(collect(&scheduler, &it), items[2..5].to_vec());
}

#[test]
fn test_take_zero_is_empty() {
    let scheduler = setup();
    let it = from_array(vec![1, 2, 3]).take(0);
    assert_eq!(collect(&scheduler, &it), Vec::<i32>::new());
}

#[test]
fn test_range_of_positions() {
    let scheduler = setup();
    let it = from_array(vec![10, 20, 30, 40, 50]).range(1, 3);
    assert_eq!(collect(&scheduler, &it), vec![20, 30, 40]);
}

#[test]
fn test_transform_offset_and_limit() {
    let scheduler = setup();
    let it = from_array(vec![10, 20, 30, 40, 50]).transform(SimpleTransformOptions {
        offset: 1,
        limit: Some(2),
        ..SimpleTransformOptions::default()
    });
    assert_eq!(collect(&scheduler, &it), vec![20, 30]);
}

#[test]
fn test_transform_filter_then_offset() {
    let scheduler = setup();
    // The offset counts only items that pass the filter
    let it = from_array(vec![1, 2, 3, 4, 5, 6, 7, 8]).transform(SimpleTransformOptions {
        filter: Some(Box::new(|x: &i32| x % 2 == 0)),
        offset: 1,
        ..SimpleTransformOptions::default()
    });
    assert_eq!(collect(&scheduler, &it), vec![4, 6, 8]);
}

#[test]
fn test_transform_map_with_optional_pushes_original() {
    let scheduler = setup();
    let it = from_array(vec![1, 2, 3, 4]).transform(SimpleTransformOptions {
        optional: true,
        map: Some(Box::new(|x: i32| (x % 2 == 0).then_some(x * 100))),
        ..SimpleTransformOptions::default()
    });
    assert_eq!(collect(&scheduler, &it), vec![1, 200, 3, 400]);
}

#[test]
fn test_square_map_take_pipeline() {
    let scheduler = setup();
    let it = range(1, 100).map(|x| x * x).take(3);
    assert_eq!(collect(&scheduler, &it), vec![1, 4, 9]);
}

#[test]
fn test_async_transform_pushes_multiple_items() {
    let scheduler = setup();
    let it = transform_with(
        from_array(vec![1, 2]),
        TransformOptions::default(),
        |item, done, push| {
            push(item);
            push(item + 100);
            done();
        },
    );
    assert_eq!(collect(&scheduler, &it), vec![1, 101, 2, 102]);
}

#[test]
fn test_optional_transform_passes_items_through() {
    let scheduler = setup();
    let it = transform_with(
        from_array(vec![1, 2, 3]),
        TransformOptions {
            optional: true,
            ..TransformOptions::default()
        },
        |_item, done, _push| done(),
    );
    assert_eq!(collect(&scheduler, &it), vec![1, 2, 3]);
}

#[test]
fn test_optional_transform_mixes_pushed_and_original() {
    let scheduler = setup();
    let it = transform_with(
        from_array(vec![1, 2, 3, 4]),
        TransformOptions {
            optional: true,
            ..TransformOptions::default()
        },
        |item, done, push| {
            if item % 2 == 0 {
                push(item * 10);
            }
            done();
        },
    );
    assert_eq!(collect(&scheduler, &it), vec![1, 20, 3, 40]);
}

#[test]
fn test_prepend_and_append() {
    let scheduler = setup();
    let it = from_array(vec![3, 4]).prepend(vec![1, 2]).append(vec![5, 6]);
    assert_eq!(collect(&scheduler, &it), vec![1, 2, 3, 4, 5, 6]);
}

#[test]
fn test_surround() {
    let scheduler = setup();
    let it = from_array(vec![2]).surround(vec![1], vec![3]);
    assert_eq!(collect(&scheduler, &it), vec![1, 2, 3]);
}

#[test]
fn test_wrap_returns_iterator_unchanged_without_options() {
    let _scheduler = setup();
    let source = from_array(vec![1, 2]);
    let wrapped = wrap(source.clone(), None);
    // Reading the wrapper consumes the original directly
    assert_eq!(wrapped.read(), Some(1));
    assert_eq!(source.read(), Some(2));
}

#[test]
fn test_wrap_with_options_rebuffers() {
    let scheduler = setup();
    let it = wrap(
        from_array(vec![1, 2, 3]),
        Some(TransformOptions::default()),
    );
    assert_eq!(collect(&scheduler, &it), vec![1, 2, 3]);
}

#[test]
fn test_wrap_future_source() {
    let scheduler = setup();
    let it = wrap(
        SourceExpr::future(async { Ok(from_array(vec![7, 8, 9])) }),
        Some(TransformOptions::default()),
    );
    assert_eq!(collect(&scheduler, &it), vec![7, 8, 9]);
}

#[test]
fn test_wrap_failed_future_emits_error() {
    let scheduler = setup();
    let it: AsyncIterator<i32> = wrap(
        SourceExpr::future(async { Err(IterError::custom("no source")) }),
        Some(TransformOptions::default()),
    );
    let errors = Rc::new(Cell::new(0));
    {
        let counter = errors.clone();
        it.on_error(move |_| counter.set(counter.get() + 1));
    }
    scheduler.drain();
    assert_eq!(errors.get(), 1);
}

#[test]
fn test_wrap_factory_source() {
    let scheduler = setup();
    let it = wrap(SourceExpr::factory(|| from_array(vec![1, 2])), None);
    assert_eq!(collect(&scheduler, &it), vec![1, 2]);
}

#[test]
fn test_multi_transform_expands_items_in_order() {
    let scheduler = setup();
    let it = multi_transform(
        from_array(vec![1, 2, 3]),
        |item| Some(from_array(vec![item * 10, item * 10 + 1])),
        TransformOptions::default(),
    );
    assert_eq!(collect(&scheduler, &it), vec![10, 11, 20, 21, 30, 31]);
}

#[test]
fn test_multi_transform_optional_keeps_unexpanded_items() {
    let scheduler = setup();
    let it = multi_transform(
        from_array(vec![1, 2, 3, 4]),
        |item| {
            if item % 2 == 0 {
                Some(from_array(vec![item * 10]))
            } else {
                None
            }
        },
        TransformOptions {
            optional: true,
            ..TransformOptions::default()
        },
    );
    assert_eq!(collect(&scheduler, &it), vec![1, 20, 3, 40]);
}

#[test]
fn test_transform_destroys_source_by_default() {
    let scheduler = setup();
    let source = from_array(vec![1, 2, 3]);
    let it = source.clone().take(1);
    assert_eq!(collect(&scheduler, &it), vec![1]);
    scheduler.drain();
    assert!(source.done());
}

#[test]
fn test_transform_keeps_source_when_asked() {
    let scheduler = setup();
    let source = from_array(vec![1, 2, 3]);
    let it = source.clone().transform(SimpleTransformOptions {
        limit: Some(1),
        destroy_source: false,
        ..SimpleTransformOptions::default()
    });
    assert_eq!(collect(&scheduler, &it), vec![1]);
    scheduler.drain();
    // The source survives and remains readable by other consumers
    assert!(!source.done());
    assert_eq!(source.read(), Some(2));
}
