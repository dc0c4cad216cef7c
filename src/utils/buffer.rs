//! Interleaved sample buffer helpers.

// -------------------------------------------------------------------------------------------------

/// Set all samples of the given buffer to exact zeros.
#[inline]
pub fn clear_buffer(buffer: &mut [f32]) {
    buffer.fill(0.0);
}

// -------------------------------------------------------------------------------------------------

/// Multiply all samples in the given buffer with the given gain factor.
#[inline]
pub fn scale_buffer(buffer: &mut [f32], gain: f32) {
    if gain != 1.0 {
        for sample in buffer.iter_mut() {
            *sample *= gain;
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Fill an interleaved buffer frame by frame: `produce` is called once per frame and its
/// value is written into all channels of that frame. Returns the number of frames written.
#[inline]
pub fn fill_frames<F>(buffer: &mut [f32], channel_count: usize, mut produce: F) -> usize
where
    F: FnMut() -> f32,
{
    debug_assert!(channel_count > 0, "Invalid channel count");
    debug_assert!(
        buffer.len() % channel_count == 0,
        "Buffer should contain whole frames only"
    );
    // Eliminate channel count match branch from hot path
    match channel_count {
        1 => {
            for sample in buffer.iter_mut() {
                *sample = produce();
            }
            buffer.len()
        }
        2 => {
            let mut frames = buffer.chunks_exact_mut(2);
            for frame in &mut frames {
                let value = produce();
                frame[0] = value;
                frame[1] = value;
            }
            buffer.len() / 2
        }
        _ => {
            let mut frames = buffer.chunks_exact_mut(channel_count);
            for frame in &mut frames {
                frame.fill(produce());
            }
            buffer.len() / channel_count
        }
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill() {
        let mut counter = 0.0;
        let mut produce = || {
            counter += 1.0;
            counter
        };

        let mut mono = [0.0; 3];
        assert_eq!(fill_frames(&mut mono, 1, &mut produce), 3);
        assert_eq!(mono, [1.0, 2.0, 3.0]);

        let mut stereo = [0.0; 4];
        assert_eq!(fill_frames(&mut stereo, 2, &mut produce), 2);
        assert_eq!(stereo, [4.0, 4.0, 5.0, 5.0]);

        let mut surround = [0.0; 6];
        assert_eq!(fill_frames(&mut surround, 3, &mut produce), 2);
        assert_eq!(surround, [6.0, 6.0, 6.0, 7.0, 7.0, 7.0]);
    }

    #[test]
    fn gain() {
        let mut buffer = [1.0, -0.5, 0.25];
        scale_buffer(&mut buffer, 0.5);
        assert_eq!(buffer, [0.5, -0.25, 0.125]);
        clear_buffer(&mut buffer);
        assert!(buffer.iter().all(|s| *s == 0.0));
    }
}
