#![no_main]

use arbitrary::Arbitrary;
use image::{Rgb, RgbImage};
use libfuzzer_sys::fuzz_target;
use postfx::engine::{Pipeline, UnderlineCache};
use postfx::ops::{
    AdjustmentParams, FilterKind, GlowParams, GrainParams, PipelineConfig, TextParams,
    TextPosition, UnderlineParams,
};

#[derive(Arbitrary, Debug)]
struct ConfigSeed {
    width: u8,
    height: u8,
    filter: u8,
    adjustments: [f32; 4],
    glow: (bool, f32, f32),
    grain: (bool, f32, u64),
    text: String,
    position: u8,
    size: u8,
    underline: (bool, [u8; 3], u8, u64),
}

fn build_config(seed: &ConfigSeed) -> PipelineConfig {
    let [b, c, s, sh] = seed.adjustments;
    PipelineConfig {
        filter: FilterKind::ALL[seed.filter as usize % FilterKind::ALL.len()],
        adjustments: AdjustmentParams::new(b, c, s, sh),
        glow: GlowParams {
            enabled: seed.glow.0,
            strength: seed.glow.1,
            radius: seed.glow.2,
        },
        grain: GrainParams {
            enabled: seed.grain.0,
            amount: seed.grain.1,
            seed: Some(seed.grain.2),
        },
        text: TextParams {
            enabled: true,
            text: seed.text.chars().take(32).collect(),
            position: match seed.position % 3 {
                0 => TextPosition::TopCenter,
                1 => TextPosition::MiddleCenter,
                _ => TextPosition::BottomCenter,
            },
            size: seed.size as u32,
            color: Rgb([255, 255, 255]),
            underline: UnderlineParams {
                enabled: seed.underline.0,
                color: Rgb(seed.underline.1),
                thickness: seed.underline.2 as u32,
                seed: seed.underline.3,
            },
        },
    }
    .clamped()
}

fuzz_target!(|seed: ConfigSeed| {
    let width = seed.width as u32 % 96 + 1;
    let height = seed.height as u32 % 96 + 1;
    let base = RgbImage::from_fn(width, height, |x, y| Rgb([x as u8, y as u8, (x ^ y) as u8]));
    let config = build_config(&seed);

    let pipeline = Pipeline::new().with_font_candidates(Vec::<std::path::PathBuf>::new());
    let cache = UnderlineCache::new();
    let out = pipeline.run_with_cache(&base, &config, &cache);
    assert_eq!(out.dimensions(), base.dimensions());
});
