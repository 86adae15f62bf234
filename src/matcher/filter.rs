//! Box and Gaussian smoothing filters
//!
//! The matcher smooths the bit-distance curve with an approximated Gaussian:
//! a short sequence of sliding box filters whose widths are derived from the
//! requested sigma. The kernels are pure `f64` and fully deterministic; unit
//! tests pin their outputs bit-for-bit.

/// Mirror an index into `0..n` by reflecting it at both edges.
fn reflect(index: isize, n: usize) -> usize {
    let n = n as isize;
    let mut i = index;
    loop {
        if i < 0 {
            i = -1 - i;
        } else if i >= n {
            i = 2 * n - 1 - i;
        } else {
            return i as usize;
        }
    }
}

/// Sliding box filter of width `w`, centred with `w / 2` taps to the left and
/// `w - w / 2` to the right. Out-of-range taps reflect at the edges.
pub fn box_filter(src: &[f64], dst: &mut [f64], w: usize) {
    let n = src.len();
    debug_assert_eq!(dst.len(), n);
    if n == 0 {
        return;
    }
    if w == 0 {
        dst.copy_from_slice(src);
        return;
    }

    let wl = (w / 2) as isize;
    let wr = (w - w / 2) as isize;
    let scale = 1.0 / w as f64;

    let mut sum = 0.0;
    for i in -wl..wr {
        sum += src[reflect(i, n)];
    }
    for i in 0..n {
        dst[i] = sum * scale;
        sum += src[reflect(i as isize + wr, n)] - src[reflect(i as isize - wl, n)];
    }
}

/// Box widths and pass split approximating a Gaussian of `sigma` with
/// `passes` box filters: `m` passes of the lower width, the rest of the
/// upper width.
fn box_widths(sigma: f64, passes: usize) -> (usize, usize, usize) {
    let n = passes as f64;
    let w = (12.0 * sigma * sigma / n + 1.0).sqrt().floor() as i64;
    let mut wl = w;
    if wl % 2 == 0 {
        wl -= 1;
    }
    let wu = wl + 2;
    let wlf = wl as f64;
    let m = (0.5
        + (12.0 * sigma * sigma - n * wlf * wlf - 4.0 * n * wlf - 3.0 * n)
            / (-4.0 * wlf - 4.0))
        .floor() as i64;
    (wl.max(0) as usize, wu.max(0) as usize, m.clamp(0, passes as i64) as usize)
}

/// Smooth `data` in place with `passes` successive box filters approximating
/// a Gaussian of the given `sigma`. Runs on a ping-pong buffer pair; the
/// buffer that last received output becomes the result.
pub fn gaussian_filter(data: &mut [f64], sigma: f64, passes: usize) {
    let n = data.len();
    if n == 0 || passes == 0 {
        return;
    }

    let (wl, wu, m) = box_widths(sigma, passes);

    let mut src = data.to_vec();
    let mut dst = vec![0.0; n];
    for pass in 0..passes {
        let w = if pass < m { wl } else { wu };
        box_filter(&src, &mut dst, w);
        std::mem::swap(&mut src, &mut dst);
    }
    data.copy_from_slice(&src);
}
