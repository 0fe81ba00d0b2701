use std::collections::HashMap;
use std::error::Error;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;

use clap::{Parser, ValueEnum};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaChaRng;
use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use lpsampling::hash::{HashFunction, MurmurHash};
use lpsampling::{Accuracy, Context, MemoryUsage, Registry, Sampler, SamplingError};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    /// `updates` unit insertions at uniformly random indices.
    Uniform,
    /// Every index once, plus index 0 with weight `domain-size`.
    Outlier,
    /// `updates` insertions at exponentially distributed ranks, scattered
    /// over the domain by a hash, with weights uniform in
    /// `[0, sqrt(domain-size))`.
    PowerLaw,
}

/// Runs many independent sampler instances over one stream and compares
/// the empirical sampling distribution with the exact one.
#[derive(Debug, Parser)]
struct Configuration {
    #[arg(long, default_value = "distinct")]
    sampler: String,

    #[arg(long, default_value = "murmur")]
    hash: String,

    #[arg(long, default_value_t = 1000)]
    domain_size: u64,

    #[arg(long, default_value_t = 10_000)]
    updates: usize,

    #[arg(long, value_enum, default_value = "outlier")]
    format: Format,

    /// File of `index weight` lines, replacing the generated stream.
    #[arg(long)]
    input: Option<PathBuf>,

    /// Number of independent sampler instances.
    #[arg(long, default_value_t = 1000)]
    samplers: usize,

    #[arg(long, default_value_t = 1)]
    jobs: usize,

    #[arg(long)]
    seed: Option<u64>,

    #[arg(long, default_value_t = 0.25)]
    relative_error: f64,

    #[arg(long, default_value_t = 0.01)]
    absolute_error: f64,

    #[arg(long, default_value_t = 0.01)]
    failure_probability: f64,

    /// Defaults to standard output.
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Default)]
struct Tally {
    failures: usize,
    memory:   usize,
    counts:   HashMap<u64, usize>,
}

impl Tally {
    fn extend(&mut self, other: Tally) {
        self.failures += other.failures;
        self.memory = self.memory.max(other.memory);

        for (index, count) in other.counts {
            *self.counts.entry(index).or_insert(0) += count;
        }
    }
}

#[derive(Debug, Serialize)]
struct Row {
    index:     u64,
    frequency: i64,
    expected:  f64,
    empirical: f64,
    samples:   usize,
}

fn load(path: &Path) -> Result<Vec<(u64, i64)>, Box<dyn Error>> {
    let reader = BufReader::new(File::open(path)?);

    let mut stream = Vec::with_capacity(10000);

    for line in reader.lines() {
        let line = line?;
        let mut fields = line.split_whitespace();

        let (index, weight) = match (fields.next(), fields.next()) {
            (Some(index), Some(weight)) => (index.parse()?, weight.parse()?),
            (None, _) => continue,
            _ => return Err(format!("malformed line `{}`", line).into()),
        };

        stream.push((index, weight));
    }

    Ok(stream)
}

fn generate(conf: &Configuration, rng: &mut ChaChaRng) -> Vec<(u64, i64)> {
    let mut stream: Vec<(u64, i64)> = match conf.format {
        Format::Uniform => (0..conf.updates)
            .map(|_| (rng.gen_range(0, conf.domain_size), 1))
            .collect(),
        Format::Outlier => {
            let mut stream: Vec<(u64, i64)> =
                (0..conf.domain_size).map(|i| (i, 1)).collect();

            stream.push((0, conf.domain_size as i64 - 1));
            stream
        },
        Format::PowerLaw => {
            let n = conf.domain_size;
            let scatter = MurmurHash::new(rng.gen());
            let sqrt_n = ((n as f64).sqrt() as u64).max(1);
            let mean_rank = n as f64 / (n as f64).ln().max(1.0);

            (0..conf.updates)
                .map(|_| {
                    let u: f64 = rng.gen();
                    let rank = (-mean_rank * (1.0 - u).ln()) as u64;

                    (scatter.to_range(rank, n), rng.gen_range(0, sqrt_n) as i64)
                })
                .collect()
        },
    };

    stream.shuffle(rng);

    stream
}

/// Exact probability of every index under `|f_i|^p` sampling.
fn expected(frequencies: &HashMap<u64, i64>, p: f64) -> HashMap<u64, f64> {
    let weight = |f: i64| {
        if f == 0 {
            0.0
        } else if p == 0.0 {
            1.0
        } else {
            (f.abs() as f64).powf(p)
        }
    };

    let total: f64 = frequencies.values().map(|f| weight(*f)).sum();

    frequencies
        .iter()
        .map(|(index, f)| (*index, if total > 0.0 { weight(*f) / total } else { 0.0 }))
        .collect()
}

fn run(
    conf: Arc<Configuration>,
    registry: Arc<Registry>,
    stream: Arc<Vec<(u64, i64)>>,
) -> Result<Tally, Box<dyn Error>> {
    let counter = Arc::new(Mutex::new(0));

    let threads: Vec<thread::JoinHandle<Result<Tally, SamplingError>>> = (0..conf
        .jobs
        .max(1))
        .map(|_| {
            let conf = Arc::clone(&conf);
            let registry = Arc::clone(&registry);
            let stream = Arc::clone(&stream);
            let counter = Arc::clone(&counter);

            thread::spawn(move || -> Result<Tally, SamplingError> {
                let factory = registry.sampler(&conf.sampler)?;
                let hasher = registry.hash(&conf.hash)?;
                let accuracy = Accuracy::new(
                    conf.relative_error,
                    conf.absolute_error,
                    conf.failure_probability,
                )?;

                let mut tally = Tally::default();

                loop {
                    let i;

                    {
                        let mut counter =
                            counter.lock().unwrap_or_else(|e| e.into_inner());

                        if *counter == conf.samplers {
                            break;
                        }

                        i = *counter;

                        *counter += 1;

                        debug!("processing: {}/{}", i + 1, conf.samplers);
                    }

                    let mut context = match conf.seed {
                        Some(seed) => Context::from_seed(
                            seed.wrapping_add(1 + i as u64),
                            hasher,
                        ),
                        None => Context::new(hasher),
                    };

                    let mut sampler = factory(&mut context, conf.domain_size, &accuracy)?;

                    for &(index, weight) in stream.iter() {
                        sampler.update(index, weight)?;
                    }

                    tally.memory = tally.memory.max(sampler.memory_used());

                    match sampler.query() {
                        Some(sample) => *tally.counts.entry(sample.index).or_insert(0) += 1,
                        None => tally.failures += 1,
                    }
                }

                Ok(tally)
            })
        })
        .collect();

    let mut tally = Tally::default();

    for thread in threads {
        match thread.join() {
            Ok(result) => tally.extend(result?),
            Err(_) => return Err("worker thread panicked".into()),
        }
    }

    Ok(tally)
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "evl=info".into()),
        )
        .with_writer(io::stderr)
        .init();

    let conf = Configuration::parse();
    let registry = Registry::default();

    let mut rng = match conf.seed {
        Some(seed) => ChaChaRng::seed_from_u64(seed),
        None => ChaChaRng::from_entropy(),
    };

    let stream = match &conf.input {
        Some(path) => load(path)?,
        None => generate(&conf, &mut rng),
    };

    let mut frequencies: HashMap<u64, i64> = HashMap::new();

    for &(index, weight) in stream.iter() {
        *frequencies.entry(index).or_insert(0) += weight;
    }

    // Validates the names before spawning any worker.
    let p = {
        let mut context = Context::from_seed(0, registry.hash(&conf.hash)?);
        let accuracy = Accuracy::new(
            conf.relative_error,
            conf.absolute_error,
            conf.failure_probability,
        )?;

        let factory = registry.sampler(&conf.sampler)?;

        factory(&mut context, conf.domain_size, &accuracy)?.p()
    };

    info!(
        sampler = conf.sampler.as_str(),
        hash = conf.hash.as_str(),
        n = conf.domain_size,
        updates = stream.len(),
        instances = conf.samplers,
        "starting evaluation"
    );

    let conf = Arc::new(conf);
    let tally = run(Arc::clone(&conf), Arc::new(registry), Arc::new(stream))?;

    let successes = conf.samplers - tally.failures;

    info!(
        successes,
        failures = tally.failures,
        memory_words = tally.memory,
        "evaluation done"
    );

    let expected = expected(&frequencies, p);

    let mut indices: Vec<u64> = frequencies.keys().copied().collect();

    indices.sort_unstable();

    let mut writer: BufWriter<Box<dyn Write>> = BufWriter::new(match &conf.output {
        Some(path) => Box::new(File::create(path)?),
        None => Box::new(io::stdout()),
    });

    for index in indices {
        let samples = tally.counts.get(&index).copied().unwrap_or(0);

        let row = Row {
            index,
            frequency: frequencies[&index],
            expected: expected[&index],
            empirical: if successes > 0 {
                samples as f64 / successes as f64
            } else {
                0.0
            },
            samples,
        };

        serde_json::to_writer(&mut writer, &row)?;
        writeln!(writer)?;
    }

    writer.flush()?;

    Ok(())
}
