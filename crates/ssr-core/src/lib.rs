//! Foundational types shared across the rendering engine: the lock-free
//! command channel between non-realtime and realtime threads (C1–C3),
//! geometry primitives (C10), and the `BlockParameter` value cell used by
//! every renderer's gain pipeline.

mod block_parameter;
mod command;
mod error;
mod fifo;
mod geometry;
mod rtlist;
mod sample;
mod shared;

pub use block_parameter::BlockParameter;
pub use command::{Command, CommandQueue};
pub use error::{Error, Result};
pub use fifo::Fifo;
pub use geometry::{
    angles_to_rotation, azimuth_2d_from_rotation, look_rotation, rotation_from_2d_azimuth,
    rotation_to_angles, Position, Rotation, UP,
};
pub use rtlist::RtList;
pub use sample::{Block, BlockMut, BlockSize, Sample, SampleRate};
pub use shared::SharedData;
