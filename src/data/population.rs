//! Finite populations: building them and sampling from them.

use rand::Rng;
use rand::seq::index;

use crate::data::generate::generate;
use crate::domain::{Dataset, GeneratorParams};
use crate::error::SimError;
use crate::rng::{derive_seed, stage};

/// Draw `k` distinct rows of `source`, each row equally likely.
///
/// The returned rows are in draw order. `k == source.n_rows()` yields a
/// permutation of the source.
pub fn sample_without_replacement<R: Rng + ?Sized>(
    source: &Dataset,
    k: usize,
    rng: &mut R,
) -> Result<Dataset, SimError> {
    let available = source.n_rows();
    if k > available {
        return Err(SimError::InsufficientPopulation {
            requested: k,
            available,
        });
    }
    let picked = index::sample(rng, available, k).into_vec();
    Ok(source.select_rows(&picked))
}

/// Build a population of `size` rows by concatenating independently seeded
/// chunks of at most `chunk_size` rows.
pub fn build_population(
    params: &GeneratorParams,
    size: usize,
    chunk_size: usize,
    seed: u64,
) -> Result<Dataset, SimError> {
    if size < 1 || chunk_size < 1 {
        return Err(SimError::invalid("population and chunk size must be >= 1"));
    }

    let n_chunks = size.div_ceil(chunk_size);
    let mut parts = Vec::with_capacity(n_chunks);
    for chunk in 0..n_chunks {
        let rows = chunk_size.min(size - chunk * chunk_size);
        let chunk_seed = derive_seed(seed, &[stage::POPULATION, chunk as u64]);
        parts.push(generate(rows, params, chunk_seed)?);
    }

    let population = Dataset::concat(parts)?;
    tracing::debug!(rows = population.n_rows(), chunks = n_chunks, "built reference population");
    Ok(population)
}
