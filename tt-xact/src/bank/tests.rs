use std::sync::Arc;

use tt_shared::{AllocType, HeapMemoryManager, SharedMemoryManager, TrackingMemoryManager};

use super::*;

fn memory() -> SharedMemoryManager {
    HeapMemoryManager::shared()
}

fn sample_sound_bank() -> SoundBank {
    let mut footsteps = SoundDef::new(
        "footstep",
        vec![TrackDef {
            volume: 0.9,
            events: vec![
                EventDef {
                    timestamp: RangedValue::range(0.0, 0.05),
                    loop_count: LoopCount::Finite(2),
                    kind: EventKind::PlayWave {
                        wave: 1,
                        volume: RangedValue::range(0.7, 1.0),
                        pitch: RangedValue::fixed(1.0),
                        looping: false,
                    },
                },
                EventDef {
                    timestamp: RangedValue::fixed(0.5),
                    loop_count: LoopCount::Infinite,
                    kind: EventKind::Volume {
                        value: RangedValue::fixed(0.5),
                        relative: true,
                    },
                },
                EventDef {
                    timestamp: RangedValue::fixed(2.0),
                    loop_count: LoopCount::Finite(0),
                    kind: EventKind::Stop { immediate: false },
                },
            ],
        }],
    );
    footsteps.category = 1;
    footsteps.rpcs.push(RpcCurve {
        variable: "speed".to_string(),
        parameter: RpcParameter::Pitch,
        points: vec![(0.0, 0.5), (1.0, 1.5)],
    });

    let ambience = SoundDef::new(
        "wind",
        vec![TrackDef {
            volume: 1.0,
            events: vec![EventDef {
                timestamp: RangedValue::fixed(0.0),
                loop_count: LoopCount::Finite(0),
                kind: EventKind::Pitch {
                    value: RangedValue::range(0.9, 1.1),
                    relative: false,
                },
            }],
        }],
    );

    SoundBank::new(
        "level1",
        vec!["Default".to_string(), "Reverb".to_string()],
        vec![
            CueDef {
                name: "steps".to_string(),
                mode: VariationMode::Shuffle,
                variations: vec![
                    Variation {
                        sound: 0,
                        weight: 1.0,
                    },
                    Variation {
                        sound: 1,
                        weight: 3.0,
                    },
                ],
            },
            CueDef::single("wind", 1),
        ],
        vec![footsteps, ambience],
    )
}

fn sample_wave_bank(memory: &SharedMemoryManager) -> WaveBank {
    let ramp: Vec<i16> = (0..64).map(|i| (i * 500 - 16000) as i16).collect();
    let bytes: Vec<i8> = (0..32).map(|i| (i * 4 - 64) as i8).collect();
    WaveBank {
        name: "level1".to_string(),
        waves: vec![
            Wave::from_pcm16(memory, "ramp", 22050, &ramp)
                .unwrap()
                .with_loop(16, 48),
            Wave::from_pcm8(memory, "click", 11025, &bytes).unwrap(),
            Wave::from_adpcm(memory, "hum", 44100, &ramp).unwrap(),
        ],
    }
}

fn assert_same_waves(a: &WaveBank, b: &WaveBank) {
    assert_eq!(a.name, b.name);
    assert_eq!(a.waves.len(), b.waves.len());
    for (x, y) in a.waves.iter().zip(&b.waves) {
        assert_eq!(x.name, y.name);
        assert_eq!(x.format, y.format);
        assert_eq!(x.sample_rate, y.sample_rate);
        assert_eq!(x.frames, y.frames);
        assert_eq!(x.loop_region, y.loop_region);
        assert_eq!(x.data.as_slice(), y.data.as_slice());
    }
}

// =============================================================================
// Round trips
// =============================================================================

#[test]
fn test_sound_bank_round_trip_both_byte_orders() {
    let bank = sample_sound_bank();
    for big_endian in [false, true] {
        let bytes = write_sound_bank(&bank, big_endian);
        let loaded = sound_bank_from_bytes(&bytes, big_endian).unwrap();
        assert_eq!(loaded.name, bank.name);
        assert_eq!(loaded.categories, bank.categories);
        assert_eq!(loaded.cues, bank.cues);
        assert_eq!(loaded.sounds, bank.sounds);
        assert_eq!(loaded.cue_index("wind"), Some(1));
        assert_eq!(loaded.category_index("Reverb"), Some(1));
    }
}

#[test]
fn test_wave_bank_round_trip_both_byte_orders() {
    let memory = memory();
    let bank = sample_wave_bank(&memory);
    for big_endian in [false, true] {
        let bytes = write_wave_bank(&bank, big_endian);
        let loaded = wave_bank_from_bytes(&bytes, big_endian, &memory).unwrap();
        assert_same_waves(&bank, &loaded);
    }
}

#[test]
fn test_big_endian_pcm16_is_swapped_on_disk() {
    let memory = memory();
    let bank = WaveBank {
        name: "w".to_string(),
        waves: vec![Wave::from_pcm16(&memory, "one", 8000, &[0x1234]).unwrap()],
    };
    let le = write_wave_bank(&bank, false);
    let be = write_wave_bank(&bank, true);
    assert_eq!(&le[le.len() - 2..], &[0x34, 0x12]);
    assert_eq!(&be[be.len() - 2..], &[0x12, 0x34]);

    // In memory the data is little-endian either way
    let loaded = wave_bank_from_bytes(&be, true, &memory).unwrap();
    assert_eq!(loaded.waves[0].data.as_slice(), &[0x34, 0x12]);
}

#[test]
fn test_wrong_byte_order_is_rejected() {
    let bytes = write_sound_bank(&sample_sound_bank(), false);
    // Version 1 read big-endian is 256
    assert_eq!(
        sound_bank_from_bytes(&bytes, true).unwrap_err(),
        XactError::UnsupportedVersion(256)
    );
}

#[test]
fn test_adpcm_wave_packs_two_frames_per_byte() {
    let memory = memory();
    let samples: Vec<i16> = (0..9).map(|i| i * 100).collect();
    let wave = Wave::from_adpcm(&memory, "odd", 8000, &samples).unwrap();
    assert_eq!(wave.frames, 9);
    assert_eq!(wave.data.len(), 5);
    assert!(wave.validate(0).is_ok());
}

// =============================================================================
// Validation
// =============================================================================

#[test]
fn test_bad_magic() {
    let mut bytes = write_sound_bank(&sample_sound_bank(), false);
    bytes[0] = b'X';
    assert!(matches!(
        sound_bank_from_bytes(&bytes, false),
        Err(XactError::InvalidMagic { .. })
    ));

    // A wave bank is not a sound bank
    let waves = write_wave_bank(&sample_wave_bank(&memory()), false);
    assert_eq!(
        sound_bank_from_bytes(&waves, false).unwrap_err(),
        XactError::InvalidMagic {
            expected: SOUND_BANK_MAGIC,
            found: WAVE_BANK_MAGIC
        }
    );
}

#[test]
fn test_truncated_bank() {
    let bytes = write_sound_bank(&sample_sound_bank(), false);
    let result = sound_bank_from_bytes(&bytes[..bytes.len() - 3], false);
    assert!(matches!(result, Err(XactError::Io(_))));
}

#[test]
fn test_missing_sound_index() {
    let mut bank = sample_sound_bank();
    bank.cues[1].variations[0].sound = 7;
    let bytes = write_sound_bank(&bank, false);
    assert_eq!(
        sound_bank_from_bytes(&bytes, false).unwrap_err(),
        XactError::InvalidSoundIndex {
            cue: 1,
            sound: 7,
            count: 2
        }
    );
}

#[test]
fn test_missing_category() {
    let mut bank = sample_sound_bank();
    bank.sounds[1].category = 5;
    assert_eq!(
        bank.validate().unwrap_err(),
        XactError::InvalidCategory {
            sound: 1,
            category: 5,
            count: 2
        }
    );
}

#[test]
fn test_empty_cue() {
    let mut bank = sample_sound_bank();
    bank.cues[0].variations.clear();
    let err = bank.validate().unwrap_err();
    assert_eq!(err, XactError::EmptyCue(0));
    assert_eq!(err.to_string(), "cue 0 has no variations");
}

#[test]
fn test_missing_wave_is_caught_against_wave_bank() {
    let memory = memory();
    let mut waves = sample_wave_bank(&memory);
    let bank = sample_sound_bank();
    assert!(bank.validate_against(&waves).is_ok());

    waves.waves.truncate(1);
    assert_eq!(
        bank.validate_against(&waves).unwrap_err(),
        XactError::InvalidWaveIndex {
            sound: 0,
            track: 0,
            event: 0,
            wave: 1,
            count: 1
        }
    );
}

#[test]
fn test_unknown_event_kind() {
    let bank = SoundBank::new(
        "b",
        vec!["Default".to_string()],
        vec![CueDef::single("c", 0)],
        vec![SoundDef::new(
            "s",
            vec![TrackDef {
                volume: 1.0,
                events: vec![EventDef::play_wave(0, 1.0, 1.0)],
            }],
        )],
    );
    let mut bytes = write_sound_bank(&bank, false);
    // The only event is last: tag, timestamp (9), loops (2), wave (2),
    // volume (9), pitch (9), looping (1)
    let position = bytes.len() - 33;
    assert_eq!(bytes[position], 0);
    bytes[position] = 9;
    assert_eq!(
        sound_bank_from_bytes(&bytes, false).unwrap_err(),
        XactError::InvalidEventKind(9)
    );
}

#[test]
fn test_wave_loop_outside_frames() {
    let memory = memory();
    let bank = WaveBank {
        name: "w".to_string(),
        waves: vec![
            Wave::from_pcm8(&memory, "short", 8000, &[0; 10])
                .unwrap()
                .with_loop(4, 10),
        ],
    };
    let bytes = write_wave_bank(&bank, false);
    assert!(matches!(
        wave_bank_from_bytes(&bytes, false, &memory),
        Err(XactError::InvalidWave { wave: 0, .. })
    ));
}

#[test]
fn test_wave_loop_past_u32_range() {
    let memory = memory();
    let bank = WaveBank {
        name: "w".to_string(),
        waves: vec![
            Wave::from_pcm8(&memory, "short", 8000, &[1; 32])
                .unwrap()
                .with_loop(0xFFFF_FFF8, 0x10),
        ],
    };
    assert_eq!(bank.waves[0].loop_region.and_then(|r| r.end()), None);
    let bytes = write_wave_bank(&bank, false);
    assert!(matches!(
        wave_bank_from_bytes(&bytes, false, &memory),
        Err(XactError::InvalidWave { wave: 0, .. })
    ));
}

#[test]
fn test_wave_data_accounted_as_sample_memory() {
    let tracker = Arc::new(TrackingMemoryManager::new());
    let memory: SharedMemoryManager = tracker.clone();
    let bytes = write_wave_bank(&sample_wave_bank(&HeapMemoryManager::shared()), false);

    let loaded = wave_bank_from_bytes(&bytes, false, &memory).unwrap();
    assert_eq!(tracker.in_use(AllocType::Sample), 128 + 32 + 32);
    drop(loaded);
    assert_eq!(tracker.in_use(AllocType::Sample), 0);
}

#[test]
fn test_wave_budget_rejects_load() {
    let tracker = TrackingMemoryManager::new().with_budget(AllocType::Sample, 100);
    let memory: SharedMemoryManager = Arc::new(tracker);
    let bytes = write_wave_bank(&sample_wave_bank(&HeapMemoryManager::shared()), false);
    assert!(matches!(
        wave_bank_from_bytes(&bytes, false, &memory),
        Err(XactError::Memory(_))
    ));
}

// =============================================================================
// Values
// =============================================================================

#[test]
fn test_fixed_value_never_draws() {
    let rng = crate::random::SequenceRandom::new(vec![0.5]);
    assert_eq!(RangedValue::fixed(0.8).sample(&rng), 0.8);
    assert_eq!(rng.draws(), 0);
    assert_eq!(RangedValue::range(1.0, 3.0).sample(&rng), 2.0);
    assert_eq!(rng.draws(), 1);
}

#[test]
fn test_loop_count_raw_values() {
    assert_eq!(LoopCount::from_raw(0), LoopCount::Finite(0));
    assert_eq!(LoopCount::from_raw(INFINITE_LOOPS), LoopCount::Infinite);
    assert_eq!(LoopCount::Finite(0).total_fires(), Some(1));
    assert_eq!(LoopCount::Finite(3).total_fires(), Some(4));
    assert_eq!(LoopCount::Infinite.total_fires(), None);
}

#[test]
fn test_rpc_curve_evaluation() {
    let curve = RpcCurve {
        variable: "x".to_string(),
        parameter: RpcParameter::Volume,
        points: vec![(0.0, 0.0), (10.0, 1.0), (20.0, 0.5)],
    };
    assert_eq!(curve.evaluate(-5.0), 0.0);
    assert_eq!(curve.evaluate(5.0), 0.5);
    assert_eq!(curve.evaluate(15.0), 0.75);
    assert_eq!(curve.evaluate(100.0), 0.5);

    let empty = RpcCurve {
        points: Vec::new(),
        ..curve
    };
    assert_eq!(empty.evaluate(3.0), 1.0);
}
