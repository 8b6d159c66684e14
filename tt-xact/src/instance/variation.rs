//! Sound selection for cues with several variations

use crate::bank::{CueDef, SoundBank, VariationMode};
use crate::random::XactRandom;

#[derive(Debug, Clone, Default)]
struct CueCursor {
    /// Next position for ordered cues
    next: usize,
    /// Remaining variation positions for shuffled cues, drawn from the back
    bag: Vec<usize>,
    last: Option<usize>,
}

/// Per-cue variation state, kept by the engine across triggers
#[derive(Debug, Clone)]
pub struct VariationSelector {
    cursors: Vec<CueCursor>,
}

impl VariationSelector {
    pub fn new(bank: &SoundBank) -> Self {
        Self {
            cursors: vec![CueCursor::default(); bank.cues.len()],
        }
    }

    /// Pick the sound index the next trigger of `cue` plays
    pub fn select(&mut self, bank: &SoundBank, cue: usize, rng: &dyn XactRandom) -> Option<u16> {
        let def = bank.cues.get(cue)?;
        if def.variations.is_empty() {
            return None;
        }
        if self.cursors.len() < bank.cues.len() {
            self.cursors.resize(bank.cues.len(), CueCursor::default());
        }
        let cursor = &mut self.cursors[cue];
        let position = match def.mode {
            VariationMode::Ordered => {
                let position = cursor.next % def.variations.len();
                cursor.next = position + 1;
                position
            }
            VariationMode::Random => weighted_pick(def, rng),
            VariationMode::Shuffle => shuffle_pick(cursor, def.variations.len(), rng),
        };
        cursor.last = Some(position);
        Some(def.variations[position].sound)
    }
}

fn weighted_pick(def: &CueDef, rng: &dyn XactRandom) -> usize {
    let total: f32 = def.variations.iter().map(|v| v.weight.max(0.0)).sum();
    if total <= 0.0 {
        return rng.index(def.variations.len());
    }
    let mut target = rng.next_f32() * total;
    for (i, variation) in def.variations.iter().enumerate() {
        let weight = variation.weight.max(0.0);
        if target < weight {
            return i;
        }
        target -= weight;
    }
    // Rounding left a sliver past the last weight
    def.variations
        .iter()
        .rposition(|v| v.weight > 0.0)
        .unwrap_or(0)
}

fn shuffle_pick(cursor: &mut CueCursor, len: usize, rng: &dyn XactRandom) -> usize {
    if cursor.bag.is_empty() {
        cursor.bag = (0..len).collect();
        for i in (1..len).rev() {
            let j = rng.index(i + 1);
            cursor.bag.swap(i, j);
        }
        // No back-to-back repeat across a refill
        if len > 1 && cursor.bag.last().copied() == cursor.last {
            cursor.bag.swap(0, len - 1);
        }
    }
    cursor.bag.pop().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::{SoundDef, Variation};
    use crate::random::{PcgRandom, SequenceRandom};

    fn bank(mode: VariationMode, weights: &[f32]) -> SoundBank {
        let variations = weights
            .iter()
            .enumerate()
            .map(|(i, &weight)| Variation {
                sound: i as u16,
                weight,
            })
            .collect();
        let sounds = (0..weights.len())
            .map(|i| SoundDef::new(&format!("s{}", i), Vec::new()))
            .collect();
        SoundBank::new(
            "b",
            vec!["Default".to_string()],
            vec![CueDef {
                name: "cue".to_string(),
                mode,
                variations,
            }],
            sounds,
        )
    }

    #[test]
    fn test_ordered_cycles() {
        let bank = bank(VariationMode::Ordered, &[1.0, 1.0, 1.0]);
        let rng = SequenceRandom::new(vec![0.0]);
        let mut selector = VariationSelector::new(&bank);
        let picks: Vec<u16> = (0..7)
            .filter_map(|_| selector.select(&bank, 0, &rng))
            .collect();
        assert_eq!(picks, vec![0, 1, 2, 0, 1, 2, 0]);
        assert_eq!(rng.draws(), 0);
    }

    #[test]
    fn test_random_respects_weights() {
        let bank = bank(VariationMode::Random, &[1.0, 0.0, 3.0]);
        let rng = SequenceRandom::new(vec![0.1, 0.3, 0.9]);
        let mut selector = VariationSelector::new(&bank);
        // 0.1 * 4 = 0.4 -> first, 1.2 -> third, 3.6 -> third
        let picks: Vec<u16> = (0..3)
            .filter_map(|_| selector.select(&bank, 0, &rng))
            .collect();
        assert_eq!(picks, vec![0, 2, 2]);
    }

    #[test]
    fn test_shuffle_plays_each_once_per_round() {
        let bank = bank(VariationMode::Shuffle, &[1.0; 5]);
        let rng = PcgRandom::new(3);
        let mut selector = VariationSelector::new(&bank);
        let mut previous = None;
        for _ in 0..4 {
            let mut round: Vec<u16> = (0..5)
                .filter_map(|_| selector.select(&bank, 0, &rng))
                .collect();
            assert_ne!(round.first().copied(), previous);
            previous = round.last().copied();
            round.sort_unstable();
            assert_eq!(round, vec![0, 1, 2, 3, 4]);
        }
    }

    #[test]
    fn test_unknown_cue() {
        let bank = bank(VariationMode::Ordered, &[1.0]);
        let mut selector = VariationSelector::new(&bank);
        assert_eq!(selector.select(&bank, 3, &SequenceRandom::new(vec![])), None);
    }
}
