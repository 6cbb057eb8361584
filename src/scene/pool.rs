//! Capacity-bounded object pool backing the shared scene buffer.
//!
//! The buffer is split into sub-scenes in registration order. A sub-scene's
//! region starts where the previous one's maximum ends, so offsets never
//! move once registered. Objects only leave from the tail, which keeps every
//! live object at a stable slot without compaction.

use bytemuck::{AnyBitPattern, NoUninit};

use super::object::{Instance, SceneObject};
use crate::gpu::{BufferSlot, GpuDevice};

/// Index of a registered sub-scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubSceneId(pub usize);

/// Indirect indexed draw record, laid out as `drawIndexedIndirect` reads it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, NoUninit, AnyBitPattern)]
#[repr(C)]
pub struct DrawArgs {
    pub index_count: u32,
    pub instance_count: u32,
    pub first_index: u32,
    pub base_vertex: i32,
    pub first_instance: u32,
}

impl DrawArgs {
    pub const BYTE_LENGTH: u64 = std::mem::size_of::<Self>() as u64;
}

#[derive(Debug)]
struct SubScene {
    max_objects: u32,
    index_count: u32,
    objects: Vec<Instance>,
    draw_args: DrawArgs,
}

impl SubScene {
    fn byte_length(&self) -> u64 {
        self.max_objects as u64 * SceneObject::BYTE_LENGTH
    }
}

#[derive(Debug)]
pub struct ScenePool {
    max_sub_scenes: usize,
    capacity_bytes: u64,
    sub_scenes: Vec<SubScene>,
}

impl ScenePool {
    pub fn new(max_sub_scenes: usize, capacity_bytes: u64) -> Self {
        Self {
            max_sub_scenes,
            capacity_bytes,
            sub_scenes: Vec::with_capacity(max_sub_scenes),
        }
    }

    /// Pool sized to hold exactly the given per-sub-scene maxima.
    pub fn with_capacities(max_objects: &[u32]) -> Self {
        let capacity_bytes = max_objects
            .iter()
            .map(|&max| max as u64 * SceneObject::BYTE_LENGTH)
            .sum();
        Self::new(max_objects.len(), capacity_bytes)
    }

    /// Reserves a region for `max_objects` records drawn with a mesh of
    /// `index_count` indices.
    ///
    /// Returns `None` (with a warning) when the sub-scene limit is reached or
    /// the region would not fit in the buffer.
    pub fn register_sub_scene(&mut self, max_objects: u32, index_count: u32) -> Option<SubSceneId> {
        if self.sub_scenes.len() >= self.max_sub_scenes {
            log::warn!(
                "Maximum number of sub-scenes reached ({}). New sub-scene not added",
                self.max_sub_scenes
            );
            return None;
        }

        let bytes = max_objects as u64 * SceneObject::BYTE_LENGTH;
        if self.reserved_bytes() + bytes > self.capacity_bytes {
            log::warn!(
                "Sub-scene of {} objects does not fit in the scene buffer ({} of {} bytes reserved)",
                max_objects,
                self.reserved_bytes(),
                self.capacity_bytes
            );
            return None;
        }

        self.sub_scenes.push(SubScene {
            max_objects,
            index_count,
            objects: Vec::with_capacity(max_objects as usize),
            draw_args: DrawArgs {
                index_count,
                ..Default::default()
            },
        });

        Some(SubSceneId(self.sub_scenes.len() - 1))
    }

    /// Appends objects up to the sub-scene's maximum and returns how many
    /// were accepted. The rest are dropped with a warning.
    pub fn try_append(&mut self, id: SubSceneId, objects: impl IntoIterator<Item = Instance>) -> usize {
        let sub_scene = &mut self.sub_scenes[id.0];
        let mut appended = 0;

        for object in objects {
            if sub_scene.objects.len() >= sub_scene.max_objects as usize {
                log::warn!(
                    "Maximum number of objects reached ({}). New objects not added",
                    sub_scene.max_objects
                );
                break;
            }

            sub_scene.objects.push(object);
            appended += 1;
        }

        appended
    }

    /// Removes up to `count` objects from the tail, most recent first.
    pub fn remove(&mut self, id: SubSceneId, count: usize) -> Vec<Instance> {
        let objects = &mut self.sub_scenes[id.0].objects;
        let keep = objects.len().saturating_sub(count);
        let mut removed = objects.split_off(keep);
        removed.reverse();
        removed
    }

    /// Re-encodes the last `range` live objects and uploads only that range.
    pub fn update_transforms(&self, id: SubSceneId, range: usize, gpu: &mut impl GpuDevice) {
        let sub_scene = &self.sub_scenes[id.0];
        let live = sub_scene.objects.len();
        let range = range.min(live);

        if range == 0 {
            return;
        }

        let first = live - range;
        let records: Vec<SceneObject> = sub_scene.objects[first..]
            .iter()
            .map(Instance::to_record)
            .collect();
        let offset = self.byte_offset(id) + first as u64 * SceneObject::BYTE_LENGTH;

        gpu.write_buffer(BufferSlot::Scene, offset, bytemuck::cast_slice(&records));
    }

    /// Rewrites the sub-scene's indirect draw record.
    pub fn update_draw_args(
        &mut self,
        id: SubSceneId,
        index_count: u32,
        instance_count: u32,
        gpu: &mut impl GpuDevice,
    ) {
        let sub_scene = &mut self.sub_scenes[id.0];
        sub_scene.draw_args = DrawArgs {
            index_count,
            instance_count,
            ..Default::default()
        };

        gpu.write_buffer(
            BufferSlot::DrawArgs(id),
            0,
            bytemuck::bytes_of(&sub_scene.draw_args),
        );
    }

    /// [`Self::update_draw_args`] with the mesh's index count and the live
    /// object count.
    pub fn sync_draw_args(&mut self, id: SubSceneId, gpu: &mut impl GpuDevice) {
        let sub_scene = &self.sub_scenes[id.0];
        let (index_count, instance_count) = (sub_scene.index_count, sub_scene.objects.len() as u32);
        self.update_draw_args(id, index_count, instance_count, gpu);
    }

    /// Sum of the byte lengths of every sub-scene registered before `id`.
    pub fn byte_offset(&self, id: SubSceneId) -> u64 {
        self.sub_scenes[..id.0].iter().map(SubScene::byte_length).sum()
    }

    /// Index of the sub-scene's first record in the scene buffer.
    pub fn first_object(&self, id: SubSceneId) -> u32 {
        (self.byte_offset(id) / SceneObject::BYTE_LENGTH) as u32
    }

    pub fn reserved_bytes(&self) -> u64 {
        self.sub_scenes.iter().map(SubScene::byte_length).sum()
    }

    pub fn capacity_bytes(&self) -> u64 {
        self.capacity_bytes
    }

    pub fn max_sub_scenes(&self) -> usize {
        self.max_sub_scenes
    }

    pub fn object_count(&self, id: SubSceneId) -> usize {
        self.sub_scenes[id.0].objects.len()
    }

    #[cfg(test)]
    pub fn draw_args(&self, id: SubSceneId) -> DrawArgs {
        self.sub_scenes[id.0].draw_args
    }

    pub fn sub_scenes(&self) -> impl Iterator<Item = SubSceneId> {
        (0..self.sub_scenes.len()).map(SubSceneId)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::testing::RecordingDevice;
    use crate::math::Vec3;

    fn at(x: f32) -> Instance {
        Instance {
            position: Vec3::new(x, 0.0, 0.0),
            ..Default::default()
        }
    }

    #[test]
    fn sub_scene_offsets_follow_registration_order() {
        let mut pool = ScenePool::with_capacities(&[4, 8, 2]);
        let a = pool.register_sub_scene(4, 36).unwrap();
        let b = pool.register_sub_scene(8, 36).unwrap();
        let c = pool.register_sub_scene(2, 36).unwrap();

        assert_eq!(pool.byte_offset(a), 0);
        assert_eq!(pool.byte_offset(b), 4 * 80);
        assert_eq!(pool.byte_offset(c), 12 * 80);
        assert_eq!(pool.first_object(c), 12);
        assert_eq!(pool.reserved_bytes(), pool.capacity_bytes());
    }

    #[test]
    fn registration_past_limits_is_rejected() {
        let mut pool = ScenePool::new(2, 10 * SceneObject::BYTE_LENGTH);
        assert!(pool.register_sub_scene(6, 3).is_some());
        assert!(pool.register_sub_scene(5, 3).is_none());
        assert!(pool.register_sub_scene(4, 3).is_some());
        assert!(pool.register_sub_scene(1, 3).is_none());
        assert!(pool.reserved_bytes() <= pool.capacity_bytes());
    }

    #[test]
    fn try_append_drops_overflow() {
        let mut pool = ScenePool::with_capacities(&[3]);
        let id = pool.register_sub_scene(3, 6).unwrap();

        assert_eq!(pool.try_append(id, (0..5).map(|i| at(i as f32))), 3);
        assert_eq!(pool.object_count(id), 3);
        assert_eq!(pool.try_append(id, [at(9.0)]), 0);
    }

    #[test]
    fn remove_takes_from_the_tail() {
        let mut pool = ScenePool::with_capacities(&[8]);
        let id = pool.register_sub_scene(8, 6).unwrap();
        pool.try_append(id, (0..5).map(|i| at(i as f32)));

        let removed = pool.remove(id, 2);
        assert_eq!(removed, vec![at(4.0), at(3.0)]);
        assert_eq!(pool.sub_scenes[id.0].objects, &[at(0.0), at(1.0), at(2.0)]);

        assert_eq!(pool.remove(id, 10).len(), 3);
        assert_eq!(pool.object_count(id), 0);
    }

    #[test]
    fn update_transforms_uploads_only_the_tail_range() {
        let mut pool = ScenePool::with_capacities(&[2, 8]);
        pool.register_sub_scene(2, 6).unwrap();
        let id = pool.register_sub_scene(8, 6).unwrap();
        pool.try_append(id, (0..5).map(|i| at(i as f32)));

        let mut gpu = RecordingDevice::default();
        pool.update_transforms(id, 2, &mut gpu);

        let write = gpu.last_write_to(BufferSlot::Scene).unwrap();
        assert_eq!(write.offset, 2 * 80 + 3 * 80);
        assert_eq!(write.data.len(), 2 * 80);

        let records: Vec<SceneObject> = write
            .data
            .chunks_exact(SceneObject::BYTE_LENGTH as usize)
            .map(bytemuck::pod_read_unaligned)
            .collect();
        assert_eq!(records[0].position(), Vec3::new(3.0, 0.0, 0.0));
        assert_eq!(records[1].position(), Vec3::new(4.0, 0.0, 0.0));
    }

    #[test]
    fn update_transforms_of_nothing_writes_nothing() {
        let mut pool = ScenePool::with_capacities(&[4]);
        let id = pool.register_sub_scene(4, 6).unwrap();
        let mut gpu = RecordingDevice::default();

        pool.update_transforms(id, 3, &mut gpu);
        assert!(gpu.writes.is_empty());
    }

    #[test]
    fn draw_args_mirror_the_live_count() {
        let mut pool = ScenePool::with_capacities(&[8]);
        let id = pool.register_sub_scene(8, 972).unwrap();
        let mut gpu = RecordingDevice::default();

        pool.try_append(id, (0..6).map(|i| at(i as f32)));
        pool.sync_draw_args(id, &mut gpu);

        let args = pool.draw_args(id);
        assert_eq!(args.index_count, 972);
        assert_eq!(args.instance_count, 6);

        let write = gpu.last_write_to(BufferSlot::DrawArgs(id)).unwrap();
        assert_eq!(write.data.len() as u64, DrawArgs::BYTE_LENGTH);
        assert_eq!(bytemuck::pod_read_unaligned::<DrawArgs>(&write.data), args);
    }
}
