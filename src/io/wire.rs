//! Little-endian wire primitives over `std::io` streams.

use std::io::{self, Read, Write};

use glam::{Quat, Vec3, Vec4};

macro_rules! scalar_rw {
    ($write:ident, $read:ident, $ty:ty, $len:expr) => {
        pub fn $write(w: &mut impl Write, v: $ty) -> io::Result<()> {
            w.write_all(&v.to_le_bytes())
        }

        pub fn $read(r: &mut impl Read) -> io::Result<$ty> {
            let mut buf = [0_u8; $len];
            r.read_exact(&mut buf)?;
            Ok(<$ty>::from_le_bytes(buf))
        }
    };
}

scalar_rw!(write_u8, read_u8, u8, 1);
scalar_rw!(write_u16, read_u16, u16, 2);
scalar_rw!(write_u32, read_u32, u32, 4);
scalar_rw!(write_i32, read_i32, i32, 4);
scalar_rw!(write_f32, read_f32, f32, 4);

pub fn write_bool(w: &mut impl Write, v: bool) -> io::Result<()> {
    write_u8(w, u8::from(v))
}

pub fn read_bool(r: &mut impl Read) -> io::Result<bool> {
    Ok(read_u8(r)? != 0)
}

pub fn write_vec3(w: &mut impl Write, v: Vec3) -> io::Result<()> {
    write_f32(w, v.x)?;
    write_f32(w, v.y)?;
    write_f32(w, v.z)
}

pub fn read_vec3(r: &mut impl Read) -> io::Result<Vec3> {
    Ok(Vec3::new(read_f32(r)?, read_f32(r)?, read_f32(r)?))
}

pub fn write_vec4(w: &mut impl Write, v: Vec4) -> io::Result<()> {
    write_f32(w, v.x)?;
    write_f32(w, v.y)?;
    write_f32(w, v.z)?;
    write_f32(w, v.w)
}

pub fn read_vec4(r: &mut impl Read) -> io::Result<Vec4> {
    Ok(Vec4::new(
        read_f32(r)?,
        read_f32(r)?,
        read_f32(r)?,
        read_f32(r)?,
    ))
}

pub fn write_quat(w: &mut impl Write, v: Quat) -> io::Result<()> {
    write_f32(w, v.x)?;
    write_f32(w, v.y)?;
    write_f32(w, v.z)?;
    write_f32(w, v.w)
}

pub fn read_quat(r: &mut impl Read) -> io::Result<Quat> {
    Ok(Quat::from_xyzw(
        read_f32(r)?,
        read_f32(r)?,
        read_f32(r)?,
        read_f32(r)?,
    ))
}

/// Strings are a u32 byte length followed by UTF-8 bytes.
pub fn write_string(w: &mut impl Write, v: &str) -> io::Result<()> {
    write_u32(w, v.len() as u32)?;
    w.write_all(v.as_bytes())
}

pub fn read_string(r: &mut impl Read) -> io::Result<String> {
    let len = read_u32(r)? as usize;
    let mut buf = vec![0_u8; len];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

pub fn skip_string(r: &mut impl Read) -> io::Result<()> {
    let len = read_u32(r)?;
    skip(r, u64::from(len))
}

/// Consumes `count` bytes without interpreting them.
pub fn skip(r: &mut impl Read, count: u64) -> io::Result<()> {
    let copied = io::copy(&mut r.take(count), &mut io::sink())?;
    if copied == count {
        Ok(())
    } else {
        Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "section shorter than recorded size",
        ))
    }
}
