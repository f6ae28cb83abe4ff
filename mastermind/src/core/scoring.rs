//! Mastermind peg scoring.

use std::collections::HashMap;

use crate::core::types::Feedback;

/// Score `guess` against `secret`.
///
/// Exact matches count as black and are removed; white is then the multiset
/// intersection of the remaining colors. Callers guarantee equal lengths.
pub fn score(secret: &[u32], guess: &[u32]) -> Feedback {
    debug_assert_eq!(secret.len(), guess.len());

    let mut black = 0u32;
    let mut secret_rest: HashMap<u32, u32> = HashMap::new();
    let mut guess_rest: HashMap<u32, u32> = HashMap::new();

    for (&s, &g) in secret.iter().zip(guess) {
        if s == g {
            black += 1;
        } else {
            *secret_rest.entry(s).or_default() += 1;
            *guess_rest.entry(g).or_default() += 1;
        }
    }

    let white = guess_rest
        .iter()
        .map(|(color, &in_guess)| in_guess.min(secret_rest.get(color).copied().unwrap_or(0)))
        .sum();

    Feedback { black, white }
}
