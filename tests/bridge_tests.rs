use std::rc::Rc;

use asynciter::{
    from_array, from_stream, range, set_task_scheduler, transform_with, LocalScheduler,
    TransformOptions,
};
use futures_util::StreamExt;
use tokio::task::LocalSet;

fn use_local_scheduler() {
    set_task_scheduler(Rc::new(LocalScheduler));
}

#[tokio::test]
async fn test_into_stream_yields_all_items() {
    use_local_scheduler();
    let local = LocalSet::new();
    local
        .run_until(async {
            let items: Vec<i64> = range(1, 5).into_stream().collect().await;
            assert_eq!(items, vec![1, 2, 3, 4, 5]);
        })
        .await;
}

#[tokio::test]
async fn test_into_stream_over_transform_pipeline() {
    use_local_scheduler();
    let local = LocalSet::new();
    local
        .run_until(async {
            let it = range(1, 100).map(|x| x * x).take(4);
            let items: Vec<i64> = it.into_stream().collect().await;
            assert_eq!(items, vec![1, 4, 9, 16]);
        })
        .await;
}

#[tokio::test]
async fn test_from_stream_round_trip() {
    use_local_scheduler();
    let local = LocalSet::new();
    local
        .run_until(async {
            let it = from_stream(futures_util::stream::iter(vec![1, 2, 3]));
            assert_eq!(it.to_vec().await.unwrap(), vec![1, 2, 3]);
        })
        .await;
}

#[tokio::test]
async fn test_to_vec_under_tokio() {
    use_local_scheduler();
    let local = LocalSet::new();
    local
        .run_until(async {
            let it = from_array(vec![1, 2, 3]).map(|x| x + 1);
            assert_eq!(it.to_vec().await.unwrap(), vec![2, 3, 4]);
        })
        .await;
}

#[tokio::test]
async fn test_async_transform_under_tokio() {
    use_local_scheduler();
    let local = LocalSet::new();
    local
        .run_until(async {
            // The transform completes on a later tick via a spawned task
            let it = transform_with(
                from_array(vec![1, 2]),
                TransformOptions::default(),
                |item, done, push| {
                    tokio::task::spawn_local(async move {
                        push(item * 10);
                        done();
                    });
                },
            );
            assert_eq!(it.to_vec().await.unwrap(), vec![10, 20]);
        })
        .await;
}

#[tokio::test]
async fn test_stream_round_trip_through_bridge() {
    use_local_scheduler();
    let local = LocalSet::new();
    local
        .run_until(async {
            let stream = range(1, 4).into_stream().map(|x| x * 2);
            let it = from_stream(stream);
            let items: Vec<i64> = it.into_stream().collect().await;
            assert_eq!(items, vec![2, 4, 6, 8]);
        })
        .await;
}
