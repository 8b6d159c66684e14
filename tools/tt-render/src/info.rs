//! `tt-render info`: module summary

use std::fmt::Write;

use tt_xm::{LoopType, XmEnvelope, XmModule};

pub fn describe(module: &XmModule) -> String {
    let mut out = String::new();
    // Writing to a String cannot fail
    let _ = write_module(&mut out, module);
    out
}

fn write_module(out: &mut String, module: &XmModule) -> std::fmt::Result {
    writeln!(out, "Name:        {}", module.name)?;
    writeln!(out, "Tracker:     {}", module.tracker_name)?;
    writeln!(out, "Channels:    {}", module.num_channels)?;
    writeln!(
        out,
        "Tempo:       speed {} / {} BPM",
        module.default_speed, module.default_bpm
    )?;
    writeln!(
        out,
        "Frequencies: {}",
        if module.linear_frequency_table {
            "linear"
        } else {
            "amiga"
        }
    )?;

    let orders: Vec<String> = module.order_table.iter().map(|o| o.to_string()).collect();
    writeln!(
        out,
        "Orders:      {} (restart at {}): {}",
        module.song_length(),
        module.restart_position,
        orders.join(" ")
    )?;

    writeln!(out, "\nPatterns: {}", module.patterns.len())?;
    for (i, pattern) in module.patterns.iter().enumerate() {
        writeln!(
            out,
            "  {:3}: {:3} rows, {:5} bytes packed",
            i,
            pattern.num_rows,
            pattern.data.len()
        )?;
    }

    writeln!(out, "\nInstruments: {}", module.instruments.len())?;
    for (i, instrument) in module.instruments.iter().enumerate() {
        writeln!(
            out,
            "  {:3}: '{}' vol env {}, pan env {}, fadeout {}",
            i + 1,
            instrument.name,
            envelope_summary(&instrument.volume_envelope),
            envelope_summary(&instrument.panning_envelope),
            instrument.volume_fadeout
        )?;
        for (j, sample) in instrument.samples.iter().enumerate() {
            let looping = match sample.loop_type {
                _ if !sample.is_looping() => "one-shot".to_string(),
                LoopType::PingPong => {
                    format!("ping-pong {}..{}", sample.loop_start, sample.loop_end())
                }
                _ => format!("loop {}..{}", sample.loop_start, sample.loop_end()),
            };
            writeln!(
                out,
                "       s{}: '{}' {} frames, {}, vol {}, pan {}, finetune {}, relative {}",
                j,
                sample.name,
                sample.len(),
                looping,
                sample.volume,
                sample.panning,
                sample.finetune,
                sample.relative_note
            )?;
        }
    }
    Ok(())
}

fn envelope_summary(env: &XmEnvelope) -> String {
    if !env.is_enabled() {
        return "off".to_string();
    }
    let mut summary = format!("{} points", env.point_count());
    if let Some(offset) = env.sustain_offset() {
        let _ = write!(summary, ", sustain @{}", offset);
    }
    if let Some((begin, end)) = env.loop_offsets() {
        let _ = write!(summary, ", loop {}..{}", begin, end);
    }
    summary
}
