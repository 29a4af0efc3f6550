use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use spatial_bn::approx::{approx_eq, max_abs_diff, Tolerance};
use spatial_bn::backend::{get_execution, set_execution, Execution};
use spatial_bn::backprop::{
    spatial_bn_gradient, spatial_bn_gradient_into, spatial_bn_gradient_with,
};
use spatial_bn::error::BnError;
use spatial_bn::layout::{Layout, SavedStats};
use spatial_bn::tensors::{Ten32, Tensor};

const LAYOUTS: [Layout; 2] = [Layout::ChannelMajor, Layout::ChannelMinor];

fn random_tensor(rng: &mut StdRng, shape: &[usize]) -> Ten32 {
    let len: usize = shape.iter().product();
    Tensor::new(shape.to_vec(), (0..len).map(|_| rng.random_range(-2.0..2.0)).collect())
}

fn random_vec(rng: &mut StdRng, len: usize, lo: f32, hi: f32) -> Vec<f32> {
    (0..len).map(|_| rng.random_range(lo..hi)).collect()
}

#[test]
fn test_symmetric_pair_cancels() {
    let x = Tensor::new(vec![2, 1, 1, 1], vec![1.0, 3.0]);
    let dy = Tensor::new(vec![2, 1, 1, 1], vec![1.0, 1.0]);

    for layout in LAYOUTS {
        let stats = SavedStats::new(&[2.0], &[1.0]);
        let g = spatial_bn_gradient(&x, &dy, &[2.0], stats, layout).unwrap();
        assert_eq!(g.bias_grad.data, vec![2.0]);
        assert_eq!(g.scale_grad.data, vec![0.0]);
        assert_eq!(g.input_grad.data, vec![0.0, 0.0]);
        assert_eq!(g.input_grad.shape, vec![2, 1, 1, 1]);
        assert_eq!(g.scale_grad.shape, vec![1]);
    }
}

#[test]
fn test_zero_output_grad_gives_zero_everywhere() {
    let mut rng = StdRng::seed_from_u64(7);
    let x = random_tensor(&mut rng, &[2, 3, 4, 5]);
    let dy = Tensor::zeros(vec![2, 3, 4, 5]);

    for layout in LAYOUTS {
        let c = if layout == Layout::ChannelMajor { 3 } else { 5 };
        let scale = random_vec(&mut rng, c, -1.0, 1.0);
        let mean = random_vec(&mut rng, c, -0.5, 0.5);
        let inv_std = random_vec(&mut rng, c, 0.5, 2.0);

        let stats = SavedStats::new(&mean, &inv_std);
        let g = spatial_bn_gradient(&x, &dy, &scale, stats, layout).unwrap();
        assert!(g.bias_grad.data.iter().all(|&v| v == 0.0));
        assert!(g.scale_grad.data.iter().all(|&v| v == 0.0));
        assert!(g.input_grad.data.iter().all(|&v| v == 0.0));
    }
}

#[test]
fn test_channel_constant_at_mean_has_zero_scale_grad() {
    let mut rng = StdRng::seed_from_u64(11);
    // NCHW, C=2: channel 0 sits exactly at its mean of 0.75, channel 1 is random
    let (n, h, w) = (3, 2, 4);
    let mut x = random_tensor(&mut rng, &[n, 2, h, w]);
    for b in 0..n {
        let start = (b * 2) * h * w;
        x.data[start..start + h * w].fill(0.75);
    }
    let dy = random_tensor(&mut rng, &[n, 2, h, w]);

    let g = spatial_bn_gradient(
        &x,
        &dy,
        &[1.3, 0.7],
        SavedStats::new(&[0.75, 0.1], &[4.0, 1.0]),
        Layout::ChannelMajor,
    )
    .unwrap();

    assert_eq!(g.scale_grad.data[0], 0.0);
    assert_ne!(g.scale_grad.data[1], 0.0);
}

#[test]
fn test_scale_length_mismatch_leaves_outputs_untouched() {
    let x = Tensor::new(vec![1, 2, 1, 2], vec![1.0, 2.0, 3.0, 4.0]);
    let dy = x.clone();
    let sentinel = -12345.0;
    let mut dx = Tensor::new(vec![4], vec![sentinel; 4]);
    let mut ds = Tensor::new(vec![2], vec![sentinel; 2]);
    let mut db = Tensor::new(vec![2], vec![sentinel; 2]);

    let err = spatial_bn_gradient_into(
        &x,
        &dy,
        &[1.0, 1.0, 1.0],
        SavedStats::new(&[0.0, 0.0], &[1.0, 1.0]),
        Layout::ChannelMajor,
        &mut dx,
        &mut ds,
        &mut db,
    )
    .unwrap_err();

    assert!(matches!(err, BnError::ShapeMismatch { tensor: "scale", .. }), "{err}");
    assert_eq!(dx.data, vec![sentinel; 4]);
    assert_eq!(dx.shape, vec![4]);
    assert_eq!(ds.data, vec![sentinel; 2]);
    assert_eq!(db.data, vec![sentinel; 2]);
}

#[test]
fn test_saved_stat_length_mismatch() {
    let x = Tensor::new(vec![1, 1, 2, 2], vec![1.0, 2.0, 3.0, 4.0]);
    // channel-minor reads C=2 from the last axis
    let stats = SavedStats::new(&[0.0], &[1.0, 1.0]);
    let err = spatial_bn_gradient(&x, &x, &[1.0, 1.0], stats, Layout::ChannelMinor).unwrap_err();
    assert!(matches!(err, BnError::ShapeMismatch { tensor: "saved_mean", .. }));

    let stats = SavedStats::new(&[0.0, 0.0], &[1.0]);
    let err = spatial_bn_gradient(&x, &x, &[1.0, 1.0], stats, Layout::ChannelMinor).unwrap_err();
    assert!(matches!(err, BnError::ShapeMismatch { tensor: "saved_inv_std", .. }));
}

#[test]
fn test_rank_must_be_four() {
    let x = Tensor::new(vec![2, 2], vec![1.0, 2.0, 3.0, 4.0]);
    let stats = SavedStats::new(&[0.0, 0.0], &[1.0, 1.0]);
    let err = spatial_bn_gradient(&x, &x, &[1.0, 1.0], stats, Layout::ChannelMajor).unwrap_err();
    assert!(matches!(err, BnError::ShapeMismatch { tensor: "activation", .. }));
}

#[test]
fn test_output_grad_shape_must_match() {
    let x = Tensor::new(vec![1, 1, 2, 2], vec![1.0, 2.0, 3.0, 4.0]);
    let dy = Tensor::new(vec![1, 1, 4, 1], vec![1.0, 2.0, 3.0, 4.0]);
    let stats = SavedStats::new(&[0.0], &[1.0]);
    let err = spatial_bn_gradient(&x, &dy, &[1.0], stats, Layout::ChannelMajor).unwrap_err();
    assert!(matches!(err, BnError::ShapeMismatch { tensor: "output_grad", .. }));
}

#[test]
fn test_corrupted_data_length_is_rejected() {
    let mut x = Tensor::new(vec![1, 1, 2, 2], vec![1.0, 2.0, 3.0, 4.0]);
    let dy = x.clone();
    x.data.pop();
    let stats = SavedStats::new(&[0.0], &[1.0]);
    let err = spatial_bn_gradient(&x, &dy, &[1.0], stats, Layout::ChannelMajor).unwrap_err();
    assert!(matches!(err, BnError::ShapeMismatch { tensor: "activation", .. }));
}

#[test]
fn test_overflowing_shape_is_rejected() {
    // shape product wraps past usize::MAX; the data is tiny
    let x = Tensor { shape: vec![usize::MAX, 2, 1, 1], data: vec![0.0; 4] };
    let stats = SavedStats::new(&[0.0, 0.0], &[1.0, 1.0]);

    let result = std::panic::catch_unwind(|| {
        spatial_bn_gradient(&x, &x, &[1.0, 1.0], stats, Layout::ChannelMajor)
    });
    let err = result.expect("overflowing shape must not panic").unwrap_err();
    assert!(matches!(err, BnError::ShapeMismatch { tensor: "activation", .. }), "{err}");

    let x = Tensor { shape: vec![2, usize::MAX, 1, 2], data: vec![0.0; 4] };
    let err = spatial_bn_gradient(&x, &x, &[1.0, 1.0], stats, Layout::ChannelMinor).unwrap_err();
    assert!(matches!(err, BnError::ShapeMismatch { tensor: "activation", .. }), "{err}");
}

#[test]
fn test_empty_batch_gives_zero_channel_grads() {
    let x: Ten32 = Tensor::zeros(vec![0, 3, 2, 2]);
    let stats = SavedStats::new(&[0.0; 3], &[1.0; 3]);
    for execution in [Execution::Sequential, Execution::Parallel] {
        let g = spatial_bn_gradient_with(&x, &x, &[1.0; 3], stats, Layout::ChannelMajor, execution)
            .unwrap();
        assert!(g.input_grad.is_empty());
        assert_eq!(g.input_grad.ndim(), 4);
        assert_eq!(g.input_grad.shape, vec![0, 3, 2, 2]);
        assert_eq!(g.scale_grad.data, vec![0.0; 3]);
        assert_eq!(g.bias_grad.data, vec![0.0; 3]);
    }
}

#[test]
fn test_unknown_layout_tag() {
    let parsed = "NWHC".parse::<Layout>();
    assert!(matches!(parsed, Err(BnError::UnsupportedLayout(tag)) if tag == "NWHC"));
    assert!(matches!(Layout::try_from(2u8), Err(BnError::UnsupportedLayout(_))));
}

#[test]
fn test_non_positive_inv_std_fails_before_writing() {
    let x = Tensor::new(vec![1, 3, 1, 1], vec![1.0, 2.0, 3.0]);
    let mut dx = Tensor::new(vec![1], vec![9.0]);
    let mut ds = Tensor::new(vec![1], vec![9.0]);
    let mut db = Tensor::new(vec![1], vec![9.0]);

    for bad in [0.0, -1.0, f32::NAN] {
        let err = spatial_bn_gradient_into(
            &x,
            &x,
            &[1.0; 3],
            SavedStats::new(&[0.0; 3], &[1.0, 1.0, bad]),
            Layout::ChannelMajor,
            &mut dx,
            &mut ds,
            &mut db,
        )
        .unwrap_err();
        assert!(matches!(err, BnError::InvalidStatistics { channel: 2, .. }));
        assert_eq!(dx.data, vec![9.0]);
        assert_eq!(ds.data, vec![9.0]);
        assert_eq!(db.data, vec![9.0]);
    }
}

#[test]
fn test_outputs_are_resized_and_overwritten() {
    let mut rng = StdRng::seed_from_u64(3);
    let x = random_tensor(&mut rng, &[2, 2, 3, 3]);
    let dy = random_tensor(&mut rng, &[2, 2, 3, 3]);
    let stats = SavedStats::new(&[0.1, -0.2], &[1.5, 0.8]);

    let mut dx = Tensor::new(vec![5], vec![f32::NAN; 5]);
    let mut ds = Tensor::new(vec![7], vec![f32::NAN; 7]);
    let mut db = Tensor::default();
    let layout = Layout::ChannelMajor;
    spatial_bn_gradient_into(&x, &dy, &[1.0, 2.0], stats, layout, &mut dx, &mut ds, &mut db)
        .unwrap();

    assert_eq!(dx.shape, x.shape);
    assert_eq!(dx.len(), x.len());
    assert_eq!(ds.shape, vec![2]);
    assert_eq!(db.shape, vec![2]);
    assert!(dx.data.iter().chain(&ds.data).chain(&db.data).all(|v| v.is_finite()));

    let fresh = spatial_bn_gradient(&x, &dy, &[1.0, 2.0], stats, Layout::ChannelMajor).unwrap();
    assert!(approx_eq(&dx.data, &fresh.input_grad.data));
    assert!(approx_eq(&ds.data, &fresh.scale_grad.data));
    assert!(approx_eq(&db.data, &fresh.bias_grad.data));
}

#[test]
fn test_sequential_and_parallel_agree() {
    let mut rng = StdRng::seed_from_u64(42);
    // large enough to span many rayon tasks in both layouts
    let shape = [4, 8, 32, 32];
    let x = random_tensor(&mut rng, &shape);
    let dy = random_tensor(&mut rng, &shape);
    let tol = Tolerance::new(1e-2, 1e-3);

    for layout in LAYOUTS {
        let c = if layout == Layout::ChannelMajor { 8 } else { 32 };
        let scale = random_vec(&mut rng, c, -2.0, 2.0);
        let mean = random_vec(&mut rng, c, -0.5, 0.5);
        let inv_std = random_vec(&mut rng, c, 0.5, 2.0);
        let stats = SavedStats::new(&mean, &inv_std);

        let run = |execution| {
            spatial_bn_gradient_with(&x, &dy, &scale, stats, layout, execution).unwrap()
        };
        let (seq, par) = (run(Execution::Sequential), run(Execution::Parallel));

        let pairs = [
            ("bias_grad", &par.bias_grad, &seq.bias_grad),
            ("scale_grad", &par.scale_grad, &seq.scale_grad),
            ("input_grad", &par.input_grad, &seq.input_grad),
        ];
        for (name, par, seq) in pairs {
            let diff = max_abs_diff(&par.data, &seq.data);
            assert!(tol.all_close(&par.data, &seq.data), "{layout} {name}: max diff {diff}");
        }
    }
}

#[test]
fn test_sequential_is_bit_reproducible() {
    let mut rng = StdRng::seed_from_u64(5);
    let x = random_tensor(&mut rng, &[3, 4, 6, 6]);
    let dy = random_tensor(&mut rng, &[3, 4, 6, 6]);
    let stats = SavedStats::new(&[0.0, 0.1, 0.2, 0.3], &[1.0, 2.0, 3.0, 4.0]);

    let run = || {
        let (layout, execution) = (Layout::ChannelMajor, Execution::Sequential);
        spatial_bn_gradient_with(&x, &dy, &[1.0; 4], stats, layout, execution).unwrap()
    };
    assert_eq!(run(), run());
}

#[test]
fn test_global_execution_setting() {
    let before = get_execution();
    set_execution(Execution::Sequential);
    assert_eq!(get_execution(), Execution::Sequential);
    set_execution(before);
}
