//! The narrow device interface the simulation core talks through.
//!
//! The core never holds `wgpu` handles. It names buffers by their logical
//! role and leaves allocation, upload and dispatch to a [`GpuDevice`]
//! implementation (`wgpu_stuff::device::WgpuDevice` at runtime, a recording
//! stand-in under test).

use crate::scene::SubSceneId;

/// Logical buffers written by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferSlot {
    /// Shared per-object transform records for every sub-scene.
    Scene,
    /// Indirect draw-argument record of one sub-scene.
    DrawArgs(SubSceneId),
    /// One half of the double-buffered body-state records.
    BodyStates(usize),
    /// Per-tick physics settings uniform.
    PhysicsSettings,
}

/// Sizes of everything the device has to allocate up front.
///
/// Buffers are never resized afterwards; capacity is fixed by `max_bodies`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceLayout {
    pub scene_bytes: u64,
    pub sub_scenes: usize,
    pub body_state_bytes: u64,
    pub settings_bytes: u64,
    /// Index of the bodies sub-scene's first record in the scene buffer.
    pub first_body_object: u32,
}

pub trait GpuDevice {
    /// Creates the buffers and the physics pipeline described by `layout`.
    fn allocate(&mut self, layout: &ResourceLayout);

    fn write_buffer(&mut self, slot: BufferSlot, offset: u64, data: &[u8]);

    /// Runs the physics kernel over `workgroups` groups, reading body-state
    /// half `read_half` and writing the other one.
    fn dispatch_physics(&mut self, read_half: usize, workgroups: u32);
}

#[cfg(test)]
pub mod testing {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    pub struct Write {
        pub slot: BufferSlot,
        pub offset: u64,
        pub data: Vec<u8>,
    }

    /// Records every call instead of touching a GPU.
    #[derive(Debug, Default)]
    pub struct RecordingDevice {
        pub allocations: Vec<ResourceLayout>,
        pub writes: Vec<Write>,
        pub dispatches: Vec<(usize, u32)>,
    }

    impl RecordingDevice {
        pub fn writes_to(&self, slot: BufferSlot) -> impl Iterator<Item = &Write> {
            self.writes.iter().filter(move |write| write.slot == slot)
        }

        pub fn last_write_to(&self, slot: BufferSlot) -> Option<&Write> {
            self.writes_to(slot).last()
        }
    }

    impl GpuDevice for RecordingDevice {
        fn allocate(&mut self, layout: &ResourceLayout) {
            self.allocations.push(layout.clone());
        }

        fn write_buffer(&mut self, slot: BufferSlot, offset: u64, data: &[u8]) {
            self.writes.push(Write {
                slot,
                offset,
                data: data.to_vec(),
            });
        }

        fn dispatch_physics(&mut self, read_half: usize, workgroups: u32) {
            self.dispatches.push((read_half, workgroups));
        }
    }
}
