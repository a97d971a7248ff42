// Everything here depends on the process-wide generator, so it lives in its own test
// binary with a single test.

use aogmaneo_host::model::{Hierarchy, Searcher};
use aogmaneo_host::{runtime, HierarchyDesc, Int3, IoDesc, IoType, LayerDesc, Model, SearcherDesc};

fn desc() -> HierarchyDesc {
    HierarchyDesc::new(
        vec![
            IoDesc {
                size: Int3::new(3, 3, 8),
                ..Default::default()
            },
            IoDesc {
                size: Int3::new(1, 2, 4),
                io_type: IoType::Action,
                value_size: 16,
                history_capacity: 16,
                ..Default::default()
            },
        ],
        vec![
            LayerDesc {
                hidden_size: Int3::new(3, 3, 8),
                ..Default::default()
            },
            LayerDesc {
                hidden_size: Int3::new(2, 2, 8),
                ..Default::default()
            },
        ],
    )
}

fn input(t: i32) -> Vec<i32> {
    (0..9).map(|i| (i + t) % 8).collect()
}

// Step `h` from a pinned generator state and collect everything it predicts.
fn run(h: &mut Hierarchy, seed_state: u64, steps: i32) -> Vec<Vec<i32>> {
    runtime::set_global_state(seed_state);

    let mut out = Vec::new();
    let mut action = vec![0; 2];
    for t in 0..steps {
        h.step(&[input(t), action.clone()], true, (t % 3) as f32 * 0.5, 0.0).unwrap();
        action = h.prediction_cis(1).unwrap().to_vec();
        out.push(h.prediction_cis(0).unwrap().to_vec());
        out.push(action.clone());
        out.push(h.sample_prediction(0, 1.0).unwrap());
    }
    out
}

#[test]
fn test_pinned_seed_reproduces_everything() {
    // same seed, same model
    runtime::seed_global(1234);
    let a = Hierarchy::init_random(&desc()).unwrap();
    runtime::seed_global(1234);
    let b = Hierarchy::init_random(&desc()).unwrap();
    assert_eq!(a.serialize_to_buffer().unwrap(), b.serialize_to_buffer().unwrap());

    // full round trip continues identically
    let mut h = a;
    run(&mut h, 77, 6);

    let bytes = h.serialize_to_buffer().unwrap();
    let mut restored = Hierarchy::from_buffer(&bytes).unwrap();

    let state = runtime::global_state();
    let expected = run(&mut h, state, 8);
    let actual = run(&mut restored, state, 8);
    assert_eq!(expected, actual);
    assert_eq!(
        h.serialize_weights_to_buffer().unwrap(),
        restored.serialize_weights_to_buffer().unwrap()
    );

    // state + weights sections into a model of the same shape
    let mut other = b;
    other.set_weights_from_buffer(&h.serialize_weights_to_buffer().unwrap()).unwrap();
    other.set_state_from_buffer(&h.serialize_state_to_buffer().unwrap()).unwrap();
    other.update_params(h.params().unwrap().clone()).unwrap();
    assert_eq!(run(&mut h, 5, 4), run(&mut other, 5, 4));

    // searcher
    runtime::seed_global(9);
    let mut s = Searcher::init_random(&SearcherDesc::default()).unwrap();
    for t in 0..10 {
        s.step(t as f32 * 0.1, true).unwrap();
    }
    let s2_bytes = s.serialize_to_buffer().unwrap();
    let mut s2 = Searcher::from_buffer(&s2_bytes).unwrap();

    runtime::set_global_state(42);
    s.step(1.0, true).unwrap();
    let sample_a = s.sample_config(0.5).unwrap();
    runtime::set_global_state(42);
    s2.step(1.0, true).unwrap();
    let sample_b = s2.sample_config(0.5).unwrap();

    assert_eq!(s.config_cis().unwrap(), s2.config_cis().unwrap());
    assert_eq!(sample_a, sample_b);
}
