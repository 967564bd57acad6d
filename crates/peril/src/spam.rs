//! Random log lines for load-testing the log collector.

use rand::Rng;
use rand::seq::IndexedRandom;

const LINES: &[&str] = &[
    "Never interrupt your enemy when he is making a mistake.",
    "The hardest thing of all for a soldier is to retreat.",
    "A soldier will fight long and hard for a bit of colored ribbon.",
    "It should be the duty of every soldier to reject orders.",
    "A war between the stars and the sea resulted in a draw.",
    "To secure peace is to prepare for war.",
    "Victory belongs to the most persevering.",
    "Rather die than let the logs fall behind.",
];

/// Picks one spam line.
pub fn line<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    LINES.choose(rng).copied().unwrap_or("spam")
}
