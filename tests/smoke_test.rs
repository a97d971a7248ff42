use aogmaneo_host::codec::SizeCounter;
use aogmaneo_host::model::{Hierarchy, ImageEncoder, Searcher};
use aogmaneo_host::{
    Error, FormatError, HierarchyDesc, ImageEncoderDesc, Int3, IoDesc, IoType, LayerDesc, Model, SearcherDesc,
    ShapeMismatchError, Source, Status, ValidationError, VisibleLayerDesc,
};

fn make_cis(size: Int3) -> Vec<i32> {
    let cols = (size.x * size.y) as usize;
    let col_size = size.z as usize;
    (0..cols).map(|i| (i % col_size) as i32).collect()
}

fn single_layer_desc() -> HierarchyDesc {
    HierarchyDesc::new(
        vec![IoDesc {
            size: Int3::new(4, 4, 16),
            io_type: IoType::Prediction,
            num_dendrites_per_cell: 2,
            up_radius: 2,
            down_radius: 2,
            ..Default::default()
        }],
        vec![LayerDesc {
            hidden_size: Int3::new(4, 4, 16),
            num_dendrites_per_cell: 2,
            up_radius: 2,
            recurrent_radius: -1,
            down_radius: 2,
            ..Default::default()
        }],
    )
}

#[test]
fn test_zero_input_without_learning_keeps_weights() {
    let mut h = Hierarchy::init_random(&single_layer_desc()).unwrap();
    let before = h.serialize_weights_to_buffer().unwrap();

    h.step(&[vec![0; 16]], false, 0.0, 0.0).unwrap();

    let pred = h.prediction_cis(0).unwrap();
    assert_eq!(pred.len(), 16);
    assert!(pred.iter().all(|&ci| (0..16).contains(&ci)));

    assert_eq!(h.serialize_weights_to_buffer().unwrap(), before);
}

#[test]
fn test_rejected_step_leaves_weights_identical() {
    let mut h = Hierarchy::init_random(&single_layer_desc()).unwrap();
    let input = make_cis(Int3::new(4, 4, 16));
    h.step(&[&input], true, 0.0, 0.0).unwrap();

    let weights = h.serialize_weights_to_buffer().unwrap();
    let state = h.serialize_state_to_buffer().unwrap();

    let mut bad = input.clone();
    bad[7] = 16;
    let err = h.step(&[&bad], true, 0.0, 0.0).unwrap_err();
    assert!(matches!(
        err,
        Error::ShapeMismatch(ShapeMismatchError::InputOutOfRange {
            index: 0,
            position: 7,
            value: 16,
            column_size: 16
        })
    ));

    assert!(h.step(&[&input[..15]], true, 0.0, 0.0).is_err());
    assert!(h.step(&[&input, &input], true, 0.0, 0.0).is_err());

    assert_eq!(h.serialize_weights_to_buffer().unwrap(), weights);
    assert_eq!(h.serialize_state_to_buffer().unwrap(), state);
    assert_eq!(h.status(), Status::Ready);
}

#[test]
fn test_two_layers_multiple_io() {
    let desc = HierarchyDesc::new(
        vec![
            IoDesc {
                size: Int3::new(4, 4, 8),
                ..Default::default()
            },
            IoDesc {
                size: Int3::new(2, 2, 4),
                io_type: IoType::Action,
                value_size: 16,
                history_capacity: 32,
                ..Default::default()
            },
        ],
        vec![
            LayerDesc {
                hidden_size: Int3::new(4, 4, 16),
                ..Default::default()
            },
            LayerDesc {
                hidden_size: Int3::new(3, 3, 16),
                ticks_per_update: 2,
                temporal_horizon: 4,
                ..Default::default()
            },
        ],
    );

    let mut h = Hierarchy::init_random(&desc).unwrap();
    assert_eq!(h.num_layers().unwrap(), 2);
    assert_eq!(h.num_io().unwrap(), 2);
    // inputs plus the recurrent one
    assert_eq!(h.num_encoder_visible_layers(0).unwrap(), 3);
    assert_eq!(h.num_encoder_visible_layers(1).unwrap(), 5);

    let input0 = make_cis(Int3::new(4, 4, 8));
    let mut action = vec![0; 4];

    for t in 0..6 {
        h.step(&[&input0, &action], true, (t % 2) as f32, 0.0).unwrap();
        action = h.prediction_cis(1).unwrap().to_vec();
        assert!(action.iter().all(|&a| (0..4).contains(&a)));
    }

    for i in 0..2 {
        let size = h.io_size(i).unwrap();
        assert_eq!(h.prediction_cis(i).unwrap().len(), (size.x * size.y) as usize);
    }

    h.clear_state().unwrap();
    assert!(!h.is_updated(0).unwrap());
    h.step(&[&input0, &action], true, 0.0, 0.0).unwrap();
}

#[test]
fn test_layer_receptive_field() {
    let h = Hierarchy::init_random(&single_layer_desc()).unwrap();

    let rf = h.layer_receptive_field(0, 0, Int3::new(0, 0, 3)).unwrap();
    assert_eq!(rf.shape, (5, 5, 16));
    // corner column: window rows/cols left of the grid stay zero
    for o in 0..5 {
        for vc in 0..16 {
            assert_eq!(rf.get(0, o, vc), Some(0));
            assert_eq!(rf.get(o, 0, vc), Some(0));
        }
    }
    assert_eq!(rf.get(5, 0, 0), None);
    assert_eq!(rf.get(0, 0, 16), None);

    assert!(matches!(
        h.layer_receptive_field(0, 1, Int3::new(0, 0, 0)),
        Err(Error::ShapeMismatch(ShapeMismatchError::IndexOutOfRange { .. }))
    ));
    assert!(matches!(
        h.layer_receptive_field(0, 0, Int3::new(0, 0, 16)),
        Err(Error::ShapeMismatch(ShapeMismatchError::CoordinateOutOfBounds { .. }))
    ));
    assert!(h.layer_receptive_field(1, 0, Int3::new(0, 0, 0)).is_err());
}

#[test]
fn test_invalid_descriptors_name_the_field() {
    let mut desc = single_layer_desc();
    desc.io_descs[0].size.z = 0;
    let err = Hierarchy::init_random(&desc).unwrap_err();
    assert!(matches!(&err, Error::Validation(v) if v.field() == Some("io_descs[0].size.z")));

    let mut desc = single_layer_desc();
    desc.layer_descs.push(LayerDesc {
        ticks_per_update: 3,
        temporal_horizon: 2,
        ..Default::default()
    });
    assert!(matches!(
        Hierarchy::init_random(&desc),
        Err(Error::Validation(ValidationError::TicksExceedHorizon { .. }))
    ));

    let err = Hierarchy::open(Source::default()).unwrap_err();
    assert!(matches!(err, Error::Validation(ValidationError::NoSource)));
}

#[test]
fn test_file_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.ohr");

    let mut h = Hierarchy::init_random(&single_layer_desc()).unwrap();
    let input = make_cis(Int3::new(4, 4, 16));
    for _ in 0..3 {
        h.step(&[&input], true, 0.0, 0.0).unwrap();
    }
    h.save_to_file(&path).unwrap();

    let loaded = Hierarchy::from_file(&path).unwrap();
    assert_eq!(loaded.serialize_to_buffer().unwrap(), h.serialize_to_buffer().unwrap());

    // a buffer outranks the path
    let other = Hierarchy::init_random(&single_layer_desc()).unwrap();
    let other_bytes = other.serialize_to_buffer().unwrap();
    let opened = Hierarchy::open(Source {
        buffer: Some(other_bytes.as_slice()),
        path: Some(path.as_path()),
        desc: None,
    })
    .unwrap();
    assert_eq!(opened.serialize_to_buffer().unwrap(), other_bytes);

    let opened = Hierarchy::open(Source::path(&path)).unwrap();
    assert_eq!(opened.hidden_cis(0).unwrap(), h.hidden_cis(0).unwrap());

    assert!(matches!(
        Hierarchy::from_file(dir.path().join("missing.ohr")),
        Err(Error::Io(_))
    ));
}

#[test]
fn test_truncated_and_foreign_buffers() {
    let h = Hierarchy::init_random(&single_layer_desc()).unwrap();
    let bytes = h.serialize_to_buffer().unwrap();

    assert!(matches!(
        Hierarchy::from_buffer(&bytes[..bytes.len() / 2]),
        Err(Error::Format(FormatError::Truncated { .. }))
    ));

    let searcher = Searcher::init_random(&SearcherDesc::default()).unwrap();
    let err = Hierarchy::from_buffer(&searcher.serialize_to_buffer().unwrap()).unwrap_err();
    assert!(matches!(err, Error::Format(FormatError::BadMagic { actual: 0x53474f41, .. })));

    let mut versioned = bytes.clone();
    versioned[4] = 9;
    assert!(matches!(
        Hierarchy::from_buffer(&versioned),
        Err(Error::Format(FormatError::UnsupportedVersion { actual: 9, .. }))
    ));
}

#[test]
fn test_state_section_restores_in_place() {
    let mut h = Hierarchy::init_random(&single_layer_desc()).unwrap();
    let input = make_cis(Int3::new(4, 4, 16));
    h.step(&[&input], true, 0.0, 0.0).unwrap();

    let state = h.serialize_state_to_buffer().unwrap();
    assert_eq!(state.len(), h.state_size().unwrap());
    let hidden = h.hidden_cis(0).unwrap().to_vec();

    h.clear_state().unwrap();
    h.set_state_from_buffer(&state).unwrap();
    assert_eq!(h.hidden_cis(0).unwrap(), hidden.as_slice());
}

#[test]
fn test_out_of_range_cis_are_rejected_on_restore() {
    let mut h = Hierarchy::init_random(&single_layer_desc()).unwrap();
    let input = make_cis(Int3::new(4, 4, 16));
    h.step(&[&input], true, 0.0, 0.0).unwrap();

    // layer transients (ticks, update flag, previous hidden cis) sit just before the params
    let bytes = h.serialize_to_buffer().unwrap();
    let mut params = SizeCounter::new();
    h.params().unwrap().write(&mut params).unwrap();
    let hidden_prev = bytes.len() - params.len() - 69 + 5;
    let mut bad = bytes.clone();
    bad[hidden_prev..hidden_prev + 4].copy_from_slice(&16i32.to_le_bytes());
    assert!(matches!(
        Hierarchy::from_buffer(&bad),
        Err(Error::Format(FormatError::Corrupt { .. }))
    ));

    // the encoder's hidden cis follow the 69 bytes of layer transients
    let state = h.serialize_state_to_buffer().unwrap();
    let mut bad = state.clone();
    bad[69..73].copy_from_slice(&(-5i32).to_le_bytes());
    let err = h.set_state_from_buffer(&bad).unwrap_err();
    assert!(matches!(err, Error::Format(FormatError::Corrupt { .. })));
    assert_eq!(h.status(), Status::Failed);
    assert!(matches!(
        h.step(&[&input], true, 0.0, 0.0),
        Err(Error::Uninitialized { .. })
    ));

    let mut restored = Hierarchy::from_buffer(&bytes).unwrap();
    restored.set_state_from_buffer(&state).unwrap();
    restored.step(&[&input], true, 0.0, 0.0).unwrap();
    assert!(restored.prediction_cis(0).unwrap().iter().all(|&ci| (0..16).contains(&ci)));
}

#[test]
fn test_image_encoder_and_searcher_from_json() {
    let desc = ImageEncoderDesc::from_json_str(
        r#"{ "hidden_size": { "x": 2, "y": 2, "z": 4 },
             "visible_layer_descs": [ { "size": { "x": 4, "y": 4, "z": 3 }, "radius": 1 } ] }"#,
    )
    .unwrap();
    assert_eq!(
        desc.visible_layer_descs[0],
        VisibleLayerDesc {
            size: Int3::new(4, 4, 3),
            radius: 1
        }
    );

    let mut e = ImageEncoder::open(Source::desc(desc)).unwrap();
    e.step(&[vec![200u8; 48]], true, true).unwrap();
    assert_eq!(e.hidden_cis().unwrap().len(), 4);

    let desc = SearcherDesc::from_json_str(r#"{ "config_size": { "x": 1, "y": 2, "z": 5 } }"#).unwrap();
    assert_eq!(desc.radius, SearcherDesc::default().radius);
    let mut s = Searcher::init_random(&desc).unwrap();
    s.step(1.0, true).unwrap();
    assert_eq!(s.config_cis().unwrap().len(), 2);

    assert!(matches!(
        SearcherDesc::from_json_str(r#"{ "config_size": { "x": 1, "y": 2, "z": 1 } }"#),
        Err(Error::Validation(_))
    ));
    assert!(matches!(SearcherDesc::from_json_str("{"), Err(Error::Config(_))));
}
