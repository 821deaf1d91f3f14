//! Zero-copy read and write structures for the frames exchanged on a
//! hyperspace mesh.
//!
//! Three families of wire formats live here:
//!
//! - The IEEE 802.15.4 frame subset the TSCH MAC speaks: frame control,
//!   extended addressing (no PAN IDs), Header and Payload Information
//!   Elements, and the FCS. The most important reader is [`Frame`].
//! - The location-slot payload: [`LocBeacon`], carried as a Payload
//!   Information Element during location slots.
//! - The IPv6 side: a minimal [`Ipv6Header`] reader/writer, the
//!   [`HopByHopHeader`] with the hyperspace coordinate option
//!   ([`CoordOption`]), and the fragment header used by the router.
//!
//! Each reader contains the following functions:
//! - `new`: create a new reader, checking the buffer length.
//! - `new_unchecked`: create a new reader without checking the length.
//!
//! ## Reading a frame
//! ```
//! use hyperspace_frame::{Frame, FrameType};
//! let bytes = [
//!     0x01, 0xec, 0x2a, 0x08, 0x07, 0x06, 0x05, 0x04, 0x03, 0x02, 0x01,
//!     0x18, 0x17, 0x16, 0x15, 0x14, 0x13, 0x12, 0x11, 0xde, 0xad, 0xbe,
//!     0xef,
//! ];
//! let frame = Frame::new(&bytes[..]).unwrap();
//! assert_eq!(frame.frame_control().frame_type(), FrameType::Data);
//! assert_eq!(frame.sequence_number(), Some(42));
//! assert_eq!(frame.payload().unwrap(), &[0xde, 0xad, 0xbe, 0xef]);
//! ```
//!
//! ## Writing a frame
//! The TX path goes through [`FrameRepr`] and [`FrameBuilder`]: build a
//! representation, ask it for its [`buffer_len`], then [`emit`] it into a
//! buffer obtained from the radio.
//!
//! [`buffer_len`]: FrameRepr::buffer_len
//! [`emit`]: FrameRepr::emit
#![no_std]
#![deny(unsafe_code)]

#[cfg(any(feature = "std", test))]
#[macro_use]
extern crate std;

mod frames;
pub use frames::Frame;

mod frame_control;
pub use frame_control::*;

mod addressing;
pub use addressing::*;

mod fcs;
pub use fcs::*;

mod ie;
pub use ie::*;

mod loc_beacon;
pub use loc_beacon::*;

mod ipv6;
pub use ipv6::*;

mod hbh;
pub use hbh::*;

mod repr;
pub use repr::*;

/// An error that can occur when reading or writing a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Error;

/// A type alias for `Result<T, hyperspace_frame::Error>`.
pub type Result<T> = core::result::Result<T, Error>;
