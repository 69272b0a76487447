//! Dice notation: `[A]dS[t|s|^H|vL]`.
//!
//! `A` dice with `S` sides each; `t` totals, `s` sorts, `^H` keeps the
//! highest `H` and `vL` the lowest `L`. A bare `S` means one die.

use rand::Rng;
use std::fmt;
use thiserror::Error;

/// Upper bound on dice rolled by one expression.
pub const MAX_DICE: usize = 100_000;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DiceError {
    #[error("Invalid input")]
    Invalid,

    #[error("Too many dice")]
    TooMany,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modifier {
    None,
    Total,
    Sorted,
    Highest(usize),
    Lowest(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiceExpr {
    pub amount: usize,
    pub sides: u64,
    pub modifier: Modifier,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Roll {
    Total(u64),
    Rolls(Vec<u64>),
}

impl fmt::Display for Roll {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Roll::Total(total) => write!(f, "{}", total),
            Roll::Rolls(rolls) => {
                let rolls: Vec<String> = rolls.iter().map(u64::to_string).collect();
                write!(f, "{}", rolls.join(", "))
            }
        }
    }
}

fn count(digits: &str) -> Result<usize, DiceError> {
    digits.parse().map_err(|_| DiceError::Invalid)
}

pub fn parse(input: &str) -> Result<DiceExpr, DiceError> {
    let input: String = input.split_whitespace().collect::<String>().to_lowercase();
    let input = if input.contains('d') {
        input
    } else {
        format!("d{}", input)
    };

    let (amount, rest) = input.split_once('d').ok_or(DiceError::Invalid)?;
    let amount = if amount.is_empty() { 1 } else { count(amount)? };

    let digits_end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    let (sides, modifier) = rest.split_at(digits_end);
    let sides: u64 = sides.parse().map_err(|_| DiceError::Invalid)?;

    let modifier = match modifier {
        "" => Modifier::None,
        "t" => Modifier::Total,
        "s" => Modifier::Sorted,
        other => match (other.strip_prefix('^'), other.strip_prefix('v')) {
            (Some(highest), _) => Modifier::Highest(count(highest)?),
            (_, Some(lowest)) => Modifier::Lowest(count(lowest)?),
            _ => return Err(DiceError::Invalid),
        },
    };

    if amount == 0 || sides == 0 {
        return Err(DiceError::Invalid);
    }
    if amount > MAX_DICE {
        return Err(DiceError::TooMany);
    }

    Ok(DiceExpr {
        amount,
        sides,
        modifier,
    })
}

impl DiceExpr {
    pub fn roll<R: Rng + ?Sized>(&self, rng: &mut R) -> Roll {
        let mut rolls: Vec<u64> = (0..self.amount)
            .map(|_| rng.gen_range(1..=self.sides))
            .collect();

        match self.modifier {
            Modifier::None => Roll::Rolls(rolls),
            Modifier::Total => Roll::Total(rolls.iter().fold(0u64, |sum, r| sum.saturating_add(*r))),
            Modifier::Sorted => {
                rolls.sort_unstable();
                Roll::Rolls(rolls)
            }
            Modifier::Highest(keep) => {
                rolls.sort_unstable_by(|a, b| b.cmp(a));
                rolls.truncate(keep);
                Roll::Rolls(rolls)
            }
            Modifier::Lowest(keep) => {
                rolls.sort_unstable();
                rolls.truncate(keep);
                Roll::Rolls(rolls)
            }
        }
    }
}

/// Parse and roll with the thread RNG.
pub fn roll(input: &str) -> Result<Roll, DiceError> {
    Ok(parse(input)?.roll(&mut rand::thread_rng()))
}
