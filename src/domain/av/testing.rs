//! Tiny uncompressed clips for decoder tests.

use std::io::Write;
use std::path::Path;

/// Write a YUV4MPEG2 clip of `frames` frames. The container is detected from
/// its header, so the file may carry any extension. Every frame gets a
/// different luma level so consecutive frames are distinguishable.
pub fn write_clip(path: &Path, width: u32, height: u32, fps: u32, frames: u32) {
    assert!(width % 2 == 0 && height % 2 == 0, "4:2:0 needs even dimensions");
    let luma = (width * height) as usize;
    let chroma = luma / 4;

    let mut out = std::fs::File::create(path).unwrap();
    writeln!(out, "YUV4MPEG2 W{} H{} F{}:1 Ip A1:1 C420jpeg", width, height, fps).unwrap();
    for n in 0..frames {
        out.write_all(b"FRAME\n").unwrap();
        let level = 16 + (n * 7 % 220) as u8;
        out.write_all(&vec![level; luma]).unwrap();
        out.write_all(&vec![128u8; chroma * 2]).unwrap();
    }
    out.flush().unwrap();
}
