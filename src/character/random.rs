use crate::error::{StyleError, StyleResult};

fn random_u32() -> StyleResult<u32> {
    let mut buf = [0u8; 4];
    getrandom::fill(&mut buf).map_err(|err| StyleError::Entropy(err.to_string()))?;
    Ok(u32::from_le_bytes(buf))
}

/// Uniform index in `0..len` drawn from the OS random source.
///
/// Draws above the largest multiple of `len` are rejected so every index is
/// equally likely.
pub fn random_index(len: usize) -> StyleResult<usize> {
    if len == 0 {
        return Err(StyleError::InvalidArgument(
            "cannot select from an empty candidate set".to_string(),
        ));
    }
    let len = u32::try_from(len).map_err(|_| {
        StyleError::InvalidArgument(format!("candidate set of {len} is too large"))
    })?;

    let zone = u32::MAX - (u32::MAX % len);
    loop {
        let draw = random_u32()?;
        if draw < zone {
            return Ok((draw % len) as usize);
        }
    }
}

pub fn select_random<T>(candidates: &[T]) -> StyleResult<&T> {
    let index = random_index(candidates.len())?;
    Ok(&candidates[index])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_candidate_set_is_rejected() {
        let empty: [&str; 0] = [];
        assert!(matches!(
            select_random(&empty),
            Err(StyleError::InvalidArgument(_))
        ));
    }

    #[test]
    fn single_candidate_is_always_chosen() {
        for _ in 0..50 {
            assert_eq!(*select_random(&["only"]).unwrap(), "only");
        }
    }

    #[test]
    fn draws_are_uniform_over_five_candidates() {
        let candidates = ["superman", "batman", "joker", "hulk", "witch"];
        let draws = 10_000;
        let mut counts = [0usize; 5];
        for _ in 0..draws {
            let picked = select_random(&candidates).unwrap();
            let slot = candidates.iter().position(|c| c == picked).unwrap();
            counts[slot] += 1;
        }

        let expected = draws as f64 / candidates.len() as f64;
        let chi_squared: f64 = counts
            .iter()
            .map(|&observed| {
                let delta = observed as f64 - expected;
                delta * delta / expected
            })
            .sum();

        // 4 degrees of freedom, p = 0.001
        assert!(
            chi_squared < 18.467,
            "chi-squared {chi_squared:.2} too large for counts {counts:?}"
        );
    }
}
