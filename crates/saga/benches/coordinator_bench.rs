use std::sync::Arc;
use std::time::Duration;

use common::Payload;
use criterion::{Criterion, criterion_group, criterion_main};
use domain::{DefinitionRegistry, SagaDefinition};
use result_store::InMemoryResultStore;
use saga::{CoordinatorConfig, SagaCoordinator};
use task_channel::{ChannelConfig, InMemoryTaskChannel, TaskChannel, TaskResult};

fn registry() -> Arc<DefinitionRegistry> {
    let mut registry = DefinitionRegistry::new();
    registry.register(
        SagaDefinition::builder("purchase")
            .step_with_compensation("reserve-inventory", "release-inventory")
            .step_with_compensation("charge-payment", "refund-payment")
            .step_with_compensation("confirm-order", "cancel-order")
            .build()
            .unwrap(),
    );
    Arc::new(registry)
}

async fn drive_happy_path(counter: u64) {
    let store = InMemoryResultStore::new();
    let channel = InMemoryTaskChannel::new(ChannelConfig::default());
    let coordinator = SagaCoordinator::new(
        store,
        channel.clone(),
        registry(),
        CoordinatorConfig::default(),
    );

    let business_key = format!("O-{counter:06}");
    coordinator
        .start("purchase", &business_key, Payload::new())
        .await
        .unwrap();

    for kind in ["reserve-inventory", "charge-payment", "confirm-order"] {
        let task = channel
            .poll(kind, Duration::from_millis(100))
            .await
            .expect("task dispatched");
        coordinator
            .on_result(TaskResult::completed(task.task_id, Payload::new()))
            .await
            .unwrap();
    }
}

fn bench_happy_path_saga(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut counter = 0u64;

    c.bench_function("coordinator/happy_path_three_steps", |b| {
        b.iter(|| {
            counter += 1;
            rt.block_on(drive_happy_path(counter));
        });
    });
}

fn bench_start_with_duplicate_guard(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut counter = 0u64;

    c.bench_function("coordinator/start", |b| {
        b.iter(|| {
            counter += 1;
            rt.block_on(async {
                let store = InMemoryResultStore::new();
                let channel = InMemoryTaskChannel::new(ChannelConfig::default());
                let coordinator = SagaCoordinator::new(
                    store,
                    channel,
                    registry(),
                    CoordinatorConfig::default(),
                );
                coordinator
                    .start("purchase", &format!("O-{counter:06}"), Payload::new())
                    .await
                    .unwrap();
            });
        });
    });
}

criterion_group!(benches, bench_happy_path_saga, bench_start_with_duplicate_guard);
criterion_main!(benches);
