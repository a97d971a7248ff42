// Learn a periodic signal, then let the hierarchy run on its own predictions.
//
// The signal is quantized into two 16-cell columns (coarse and fine level). After
// training, the model goes through a file round trip and is driven in closed loop:
// each step it is fed its own greedy sample. The recall error is reported per window.
//
// Run with: cargo run --release --example wave_prediction

use aogmaneo_host::model::Hierarchy;
use aogmaneo_host::{HierarchyDesc, Int3, IoDesc, IoType, LayerDesc, Model, Result, Source};

const TRAIN_STEPS: usize = 8_000;
const RECALL_STEPS: usize = 600;
const WINDOW: usize = 100;

/// Maps a value in `[0, 1]` onto 256 levels split across two 16-cell columns.
struct Quantizer;

impl Quantizer {
    const CELLS: i32 = 16;

    fn encode(&self, v: f32) -> Vec<i32> {
        let level = (v.clamp(0.0, 1.0) * 255.0).round() as i32;
        vec![level / Self::CELLS, level % Self::CELLS]
    }

    fn decode(&self, cis: &[i32]) -> f32 {
        match cis {
            [coarse, fine] => (coarse * Self::CELLS + fine) as f32 / 255.0,
            _ => 0.0,
        }
    }
}

// Triangle with period 24 plus a spike every 9 steps
fn signal(t: usize) -> f32 {
    let phase = (t % 24) as f32 / 12.0;
    let triangle = if phase < 1.0 { phase } else { 2.0 - phase };
    if t % 9 == 0 {
        1.0
    } else {
        triangle * 0.6
    }
}

fn desc() -> HierarchyDesc {
    let io = IoDesc {
        size: Int3::new(1, 2, Quantizer::CELLS),
        io_type: IoType::Prediction,
        num_dendrites_per_cell: 4,
        ..Default::default()
    };

    // each layer runs at half the rate of the one below
    let layers = [Int3::new(4, 4, 32), Int3::new(4, 4, 32), Int3::new(3, 3, 32)]
        .into_iter()
        .map(|hidden_size| LayerDesc {
            hidden_size,
            recurrent_radius: -1,
            ..Default::default()
        })
        .collect();

    HierarchyDesc::new(vec![io], layers)
}

fn main() -> Result<()> {
    let q = Quantizer;
    let mut h = Hierarchy::open(Source::desc(desc()))?;

    for t in 0..TRAIN_STEPS {
        h.step(&[q.encode(signal(t))], true, 0.0, 0.0)?;
    }
    println!("trained {TRAIN_STEPS} steps");

    let path = std::env::temp_dir().join("wave_prediction.ohr");
    h.save_to_file(&path)?;
    let mut h = Hierarchy::open(Source::path(&path))?;
    println!("model file: {} ({} bytes)", path.display(), h.size()?);

    let mut window_error = 0.0f32;
    let mut worst = 0.0f32;
    let mut total_error = 0.0f32;

    for i in 0..RECALL_STEPS {
        let t = TRAIN_STEPS + i;
        let own = h.sample_prediction(0, 0.0)?;
        h.step(&[own], false, 0.0, 0.0)?;

        let error = (q.decode(h.prediction_cis(0)?) - signal(t + 1)).abs();
        window_error += error;
        total_error += error;
        worst = worst.max(error);

        if (i + 1) % WINDOW == 0 {
            println!("steps {:>4}..{:<4} mean error {:.3}", i + 1 - WINDOW, i + 1, window_error / WINDOW as f32);
            window_error = 0.0;
        }
    }

    println!(
        "recall: mean error {:.3}, worst {:.3}",
        total_error / RECALL_STEPS as f32,
        worst
    );

    Ok(())
}
