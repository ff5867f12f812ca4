use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use multicell_core::{MulticellConfig, World};
use std::time::Duration;

fn env_or<T: std::str::FromStr>(name: &str, fallback: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|value| value.parse::<T>().ok())
        .unwrap_or(fallback)
}

fn bench_world_steps(c: &mut Criterion) {
    let mut group = c.benchmark_group("world_step");
    group.sample_size(env_or("MC_BENCH_SAMPLES", 20_usize).max(10));
    group.warm_up_time(Duration::from_secs(env_or("MC_BENCH_WARMUP_SECS", 2)));
    group.measurement_time(Duration::from_secs(env_or("MC_BENCH_MEASURE_SECS", 10)));
    let steps = env_or("MC_BENCH_STEPS", 32_usize).max(1);
    let sizes: Vec<u32> = std::env::var("MC_BENCH_SIZES")
        .ok()
        .map(|raw| {
            raw.split(',')
                .filter_map(|token| token.trim().parse::<u32>().ok())
                .collect::<Vec<_>>()
        })
        .filter(|sizes| !sizes.is_empty())
        .unwrap_or_else(|| vec![64, 128, 256]);

    for &size in &sizes {
        group.bench_function(format!("steps{steps}_size{size}"), |b| {
            b.iter_batched(
                || {
                    let config = MulticellConfig {
                        world_size: size,
                        rng_seed: Some(0xBEEF),
                        seeding_density: 0.05,
                        mutation_chance: 0.001,
                        stagnation_ticks: 0,
                        history_capacity: 0,
                        ..MulticellConfig::default()
                    };
                    let mut world = World::new(config).expect("world");
                    world.seed();
                    // let founders differentiate before measuring
                    for _ in 0..16 {
                        world.step();
                    }
                    world
                },
                |mut world| {
                    for _ in 0..steps {
                        world.step();
                    }
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_world_steps);
criterion_main!(benches);
