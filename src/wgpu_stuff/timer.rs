//! GPU pass timing through timestamp queries.
//!
//! A [`GpuTimer`] brackets one pass per frame with begin/end timestamps,
//! resolves them into a buffer and reads that back without blocking. While a
//! readback is still in flight the next passes simply go untimed.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

pub const SAMPLE_COUNT: usize = 50;

/// Mean of the most recent `capacity` samples.
#[derive(Debug, Clone)]
pub struct RollingAverage {
    capacity: usize,
    samples: VecDeque<f64>,
    sum: f64,
}

impl RollingAverage {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            samples: VecDeque::with_capacity(capacity),
            sum: 0.0,
        }
    }

    pub fn push(&mut self, sample: f64) {
        if self.samples.len() == self.capacity {
            if let Some(oldest) = self.samples.pop_front() {
                self.sum -= oldest;
            }
        }

        self.samples.push_back(sample);
        self.sum += sample;
    }

    pub fn average(&self) -> Option<f64> {
        if self.samples.is_empty() {
            None
        } else {
            Some(self.sum / self.samples.len() as f64)
        }
    }

}

/// Microseconds below one millisecond, milliseconds above.
pub fn format_duration(nanoseconds: f64) -> String {
    let micros = nanoseconds / 1_000.0;

    if micros < 1_000.0 {
        format!("{micros:.1}µs")
    } else {
        format!("{:.2}ms", micros / 1_000.0)
    }
}

pub fn frames_per_second(frame_nanoseconds: f64) -> f64 {
    if frame_nanoseconds <= 0.0 {
        0.0
    } else {
        1e9 / frame_nanoseconds
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Readback {
    Idle,
    /// Timestamps requested for the pass being encoded.
    Recorded,
    Mapping,
    Mapped,
    Failed,
}

struct Queries {
    query_set: wgpu::QuerySet,
    resolve_buffer: wgpu::Buffer,
    readback_buffer: wgpu::Buffer,
}

pub struct GpuTimer {
    queries: Option<Queries>,
    readback: Arc<Mutex<Readback>>,
    average: RollingAverage,
    period: f32,
}

impl GpuTimer {
    const QUERY_BYTES: u64 = 2 * std::mem::size_of::<u64>() as u64;

    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue, label: &str) -> Self {
        let queries = device
            .features()
            .contains(wgpu::Features::TIMESTAMP_QUERY)
            .then(|| Queries {
                query_set: device.create_query_set(&wgpu::QuerySetDescriptor {
                    label: Some(&format!("{label} Query Set")),
                    ty: wgpu::QueryType::Timestamp,
                    count: 2,
                }),
                resolve_buffer: device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(&format!("{label} Resolve Buffer")),
                    size: Self::QUERY_BYTES,
                    usage: wgpu::BufferUsages::QUERY_RESOLVE | wgpu::BufferUsages::COPY_SRC,
                    mapped_at_creation: false,
                }),
                readback_buffer: device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(&format!("{label} Result Buffer")),
                    size: Self::QUERY_BYTES,
                    usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
                    mapped_at_creation: false,
                }),
            });

        if queries.is_none() {
            log::warn!("{label}: timestamp queries unsupported, pass timing disabled");
        }

        Self {
            queries,
            readback: Arc::new(Mutex::new(Readback::Idle)),
            average: RollingAverage::new(SAMPLE_COUNT),
            period: queue.get_timestamp_period(),
        }
    }

    pub fn is_supported(&self) -> bool {
        self.queries.is_some()
    }

    /// Marks the next pass as timed if the previous result has been
    /// collected. Call once before building the pass descriptor.
    pub fn start(&mut self) -> bool {
        if self.queries.is_none() {
            return false;
        }

        let mut readback = self.readback.lock();
        if *readback == Readback::Idle {
            *readback = Readback::Recorded;
        }
        *readback == Readback::Recorded
    }

    pub fn compute_timestamp_writes(&self) -> Option<wgpu::ComputePassTimestampWrites<'_>> {
        self.recording().map(|queries| wgpu::ComputePassTimestampWrites {
            query_set: &queries.query_set,
            beginning_of_pass_write_index: Some(0),
            end_of_pass_write_index: Some(1),
        })
    }

    pub fn render_timestamp_writes(&self) -> Option<wgpu::RenderPassTimestampWrites<'_>> {
        self.recording().map(|queries| wgpu::RenderPassTimestampWrites {
            query_set: &queries.query_set,
            beginning_of_pass_write_index: Some(0),
            end_of_pass_write_index: Some(1),
        })
    }

    fn recording(&self) -> Option<&Queries> {
        self.queries
            .as_ref()
            .filter(|_| *self.readback.lock() == Readback::Recorded)
    }

    /// Submits `encoder`, first resolving and copying out this frame's
    /// timestamps when the pass was timed, then starts the readback.
    pub fn submit_and_record_timing(&mut self, queue: &wgpu::Queue, mut encoder: wgpu::CommandEncoder) {
        let Some(queries) = self.recording() else {
            queue.submit(Some(encoder.finish()));
            return;
        };

        encoder.resolve_query_set(&queries.query_set, 0..2, &queries.resolve_buffer, 0);
        encoder.copy_buffer_to_buffer(
            &queries.resolve_buffer,
            0,
            &queries.readback_buffer,
            0,
            Self::QUERY_BYTES,
        );
        queue.submit(Some(encoder.finish()));

        *self.readback.lock() = Readback::Mapping;
        let readback = Arc::clone(&self.readback);
        queries
            .readback_buffer
            .slice(..)
            .map_async(wgpu::MapMode::Read, move |result| {
                *readback.lock() = match result {
                    Ok(()) => Readback::Mapped,
                    Err(err) => {
                        log::warn!("Timestamp readback failed: {err}");
                        Readback::Failed
                    }
                };
            });
    }

    /// Collects a finished readback, if any. Never blocks.
    pub fn poll(&mut self, device: &wgpu::Device) {
        let Some(queries) = &self.queries else {
            return;
        };

        device.poll(wgpu::Maintain::Poll);

        let mut readback = self.readback.lock();
        match *readback {
            Readback::Mapped => {
                {
                    let view = queries.readback_buffer.slice(..).get_mapped_range();
                    let begin: u64 = bytemuck::pod_read_unaligned(&view[0..8]);
                    let end: u64 = bytemuck::pod_read_unaligned(&view[8..16]);
                    if end >= begin {
                        self.average.push((end - begin) as f64 * self.period as f64);
                    }
                }
                queries.readback_buffer.unmap();
                *readback = Readback::Idle;
            }
            Readback::Failed => *readback = Readback::Idle,
            _ => {}
        }
    }

    pub fn average_nanoseconds(&self) -> Option<f64> {
        self.average.average()
    }

    /// Averaged pass time for display, or why there is none.
    pub fn display(&self) -> String {
        if !self.is_supported() {
            return "unsupported".to_owned();
        }

        self.average_nanoseconds()
            .map(format_duration)
            .unwrap_or_else(|| "-".to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn average_covers_only_the_window() {
        let mut average = RollingAverage::new(3);
        assert_eq!(average.average(), None);

        for sample in [10.0, 20.0, 30.0] {
            average.push(sample);
        }
        assert_relative_eq!(average.average().unwrap(), 20.0);

        average.push(60.0);
        assert_eq!(average.samples.len(), 3);
        assert_relative_eq!(average.average().unwrap(), (20.0 + 30.0 + 60.0) / 3.0);
    }

    #[test]
    fn zero_capacity_keeps_the_latest_sample() {
        let mut average = RollingAverage::new(0);
        average.push(5.0);
        average.push(7.0);

        assert_eq!(average.samples.len(), 1);
        assert_relative_eq!(average.average().unwrap(), 7.0);
    }

    #[test]
    fn durations_switch_units_at_a_millisecond() {
        assert_eq!(format_duration(400.0), "0.4µs");
        assert_eq!(format_duration(999_000.0), "999.0µs");
        assert_eq!(format_duration(1_000_000.0), "1.00ms");
        assert_eq!(format_duration(16_666_667.0), "16.67ms");
    }

    #[test]
    fn fps_from_frame_time() {
        assert_relative_eq!(frames_per_second(16_666_666.0), 60.0, epsilon = 1e-3);
        assert_eq!(frames_per_second(0.0), 0.0);
    }
}
