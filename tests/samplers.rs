use std::collections::HashMap;

use lpsampling::hash;
use lpsampling::{
    Accuracy, BoxedSampler, Context, DistinctSampler, PrecisionSampler,
    Registry, Sample, Sampler, SamplingError, TrulyPerfectL2Sampler,
};

/// Every index of `[0, n)` once, then index 0 again until its weight is `n`.
fn feed_outlier<S: Sampler + ?Sized>(sampler: &mut S, n: u64) {
    for i in 0..n {
        sampler.update(i, 1).unwrap();
    }

    sampler.update(0, n as i64 - 1).unwrap();
}

fn outlier_majority(samples: &[Sample]) -> f64 {
    let hits = samples.iter().filter(|s| s.index == 0).count();

    hits as f64 / samples.len() as f64
}

#[test]
fn distinct_singleton_at_every_scale() {
    for log2n in 0..=20 {
        let n = 1u64 << log2n;

        let mut context = Context::from_seed(log2n, hash::murmur);
        let mut sampler =
            DistinctSampler::new(&mut context, n, &Accuracy::default()).unwrap();

        sampler.update(n - 1, 4).unwrap();
        sampler.update(n - 1, 1).unwrap();

        assert_eq!(
            sampler.query(),
            Some(Sample {
                index:  n - 1,
                weight: 5.0,
            })
        );
    }
}

#[test]
fn distinct_net_zero() {
    let mut context = Context::from_seed(11, hash::murmur);
    let mut sampler =
        DistinctSampler::new(&mut context, 16, &Accuracy::default()).unwrap();

    sampler.update(5, 3).unwrap();
    sampler.update(5, -3).unwrap();

    assert_eq!(sampler.query(), None);
}

#[test]
fn distinct_ignores_weights() {
    let weights = [(3u64, 1i64), (100, 10), (517, -100), (1000, 1000)];
    let mut counts: HashMap<u64, usize> = HashMap::new();

    for seed in 0..400 {
        let mut context = Context::from_seed(seed, hash::murmur);
        let mut sampler =
            DistinctSampler::new(&mut context, 1024, &Accuracy::default()).unwrap();

        for &(index, weight) in weights.iter() {
            sampler.update(index, weight).unwrap();
        }

        if let Some(sample) = sampler.query() {
            let expected = weights.iter().find(|(i, _)| *i == sample.index).unwrap().1;

            assert_eq!(sample.weight, expected as f64);

            *counts.entry(sample.index).or_insert(0) += 1;
        }
    }

    let successes: usize = counts.values().sum();

    assert!(successes > 350, "{}", successes);

    for &(index, _) in weights.iter() {
        let count = counts.get(&index).copied().unwrap_or(0);

        assert!(count > successes / 8 && count < successes / 2, "{:?}", counts);
    }
}

#[test]
fn precision_outlier() {
    let accuracy = Accuracy::new(0.25, 0.01, 0.01).unwrap();
    let mut samples = Vec::new();

    for seed in 0..10 {
        let mut context = Context::from_seed(seed, hash::murmur);
        let mut sampler = PrecisionSampler::new(&mut context, 1000, &accuracy).unwrap();

        feed_outlier(&mut sampler, 1000);

        samples.extend(sampler.query());
    }

    assert!(samples.len() >= 5, "{}", samples.len());
    assert!(outlier_majority(&samples) >= 0.8);

    for sample in samples.iter().filter(|s| s.index == 0) {
        assert!((sample.weight - 1000.0).abs() < 250.0, "{:?}", sample);
    }
}

#[test]
fn truly_perfect_outlier() {
    let mut samples = Vec::new();

    for seed in 0..20 {
        let mut context = Context::from_seed(seed, hash::murmur);
        let mut sampler =
            TrulyPerfectL2Sampler::new(&mut context, 1000, &Accuracy::default())
                .unwrap();

        feed_outlier(&mut sampler, 1000);

        samples.extend(sampler.query());
    }

    assert!(samples.len() >= 18, "{}", samples.len());
    assert!(outlier_majority(&samples) >= 0.9);

    for sample in samples.iter() {
        assert!(sample.weight >= 1.0 && sample.weight <= 1000.0);
    }
}

/// Empirical distribution of successful samples over `instances` seeded
/// samplers fed `f = (1, 2, 3, 4)`, against `f_i^2 / ||f||_2^2`.
fn assert_l2_distribution<F>(instances: u64, tolerance: f64, mut build: F)
where
    F: FnMut(&mut Context) -> BoxedSampler,
{
    let weights = [1i64, 2, 3, 4];
    let total: i64 = weights.iter().map(|w| w * w).sum();
    let mut counts = [0usize; 4];

    for seed in 0..instances {
        let mut context = Context::from_seed(seed, hash::murmur);
        let mut sampler = build(&mut context);

        for (index, &weight) in weights.iter().enumerate() {
            sampler.update(index as u64, weight).unwrap();
        }

        if let Some(sample) = sampler.query() {
            counts[sample.index as usize] += 1;
        }
    }

    let successes: usize = counts.iter().sum();

    assert!(successes as u64 > instances / 2, "{}", successes);

    for (index, &weight) in weights.iter().enumerate() {
        let expected = (weight * weight) as f64 / total as f64;
        let empirical = counts[index] as f64 / successes as f64;

        assert!(
            (empirical - expected).abs() < tolerance,
            "index {}: {} vs {}",
            index,
            empirical,
            expected
        );
    }
}

#[test]
fn truly_perfect_distribution() {
    assert_l2_distribution(3000, 0.04, |context| {
        let sampler = TrulyPerfectL2Sampler::new(context, 4, &Accuracy::default());

        Box::new(sampler.unwrap()) as BoxedSampler
    });
}

#[test]
fn precision_distribution() {
    let accuracy = Accuracy::new(0.25, 0.01, 0.01).unwrap();

    assert_l2_distribution(2000, 0.06, |context| {
        Box::new(PrecisionSampler::new(context, 4, &accuracy).unwrap()) as BoxedSampler
    });
}

#[test]
fn truly_perfect_insertion_only() {
    let mut context = Context::from_seed(0, hash::murmur);
    let mut sampler =
        TrulyPerfectL2Sampler::new(&mut context, 10, &Accuracy::default()).unwrap();

    assert_eq!(sampler.update(4, -1), Err(SamplingError::NegativeWeight(-1)));
    assert_eq!(sampler.query(), None);
}

#[test]
fn registry_outlier() {
    let registry = Registry::default();
    let accuracy = Accuracy::new(0.25, 0.01, 0.01).unwrap();

    for name in registry.sampler_names() {
        let factory = registry.sampler(name).unwrap();
        let mut hits = 0;

        for seed in 0..10 {
            let mut context = Context::from_seed(seed, registry.hash("murmur").unwrap());
            let mut sampler: BoxedSampler = factory(&mut context, 256, &accuracy).unwrap();

            // A single index is sampled by every sampler, whatever its p.
            sampler.update(200, 30).unwrap();

            if let Some(sample) = sampler.query() {
                assert_eq!(sample.index, 200, "{}", name);
                hits += 1;
            }
        }

        assert!(hits >= 5, "{}: {}", name, hits);
    }
}

#[test]
fn samplers_are_send() {
    fn assert_send<T: Send>() {}

    assert_send::<DistinctSampler>();
    assert_send::<PrecisionSampler>();
    assert_send::<TrulyPerfectL2Sampler>();
    assert_send::<BoxedSampler>();
}
