//! Palette-indexed GIF output.
//!
//! A [`GifSink`] streams frames into a `.tmp` sibling of the destination.
//! Sealing writes the trailer; committing renames the sealed file into
//! place. Dropping a sink or a sealed file before it is committed removes
//! the temporary file, so a failed run never leaves a truncated GIF behind.
//! [`finish_all`] seals every output of a run before it renames any of them.

use std::{
    borrow::Cow,
    ffi::OsString,
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use gif::{Encoder, Frame, Repeat};

use crate::{error::Result, palette::Palette};

pub struct GifSink {
    encoder: Option<Encoder<BufWriter<File>>>,
    path: PathBuf,
    tmp_path: PathBuf,
    width: u16,
    height: u16,
    delay: u16,
    frames: u32,
    finished: bool,
}

impl GifSink {
    /// Start a GIF at `path` with `palette` as the global color table.
    ///
    /// `looping` adds the infinite-repeat extension; without it the file
    /// plays once. `delay` is in centiseconds.
    pub fn create(
        path: &Path,
        width: u16,
        height: u16,
        palette: &Palette,
        looping: bool,
        delay: u16,
    ) -> Result<Self> {
        let tmp_path = tmp_path(path);
        let file = File::create(&tmp_path)?;
        let mut sink = Self {
            encoder: None,
            path: path.to_path_buf(),
            tmp_path,
            width,
            height,
            delay,
            frames: 0,
            finished: false,
        };
        // From here on `sink` owns the file and cleans it up on error.
        let mut encoder = Encoder::new(BufWriter::new(file), width, height, &palette.to_rgb_bytes())?;
        if looping {
            encoder.set_repeat(Repeat::Infinite)?;
        }
        sink.encoder = Some(encoder);
        Ok(sink)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frames(&self) -> u32 {
        self.frames
    }

    /// Append one frame of palette indices, row-major, `width * height` long.
    pub fn push_frame(&mut self, indices: Vec<u8>) -> Result<()> {
        let Some(encoder) = self.encoder.as_mut() else {
            return Err(gif::EncodingError::from(std::io::Error::other("gif sink already finished")).into());
        };
        let frame = Frame {
            width: self.width,
            height: self.height,
            delay: self.delay,
            buffer: Cow::Owned(indices),
            ..Default::default()
        };
        encoder.write_frame(&frame)?;
        self.frames += 1;
        Ok(())
    }

    /// Write the trailer and flush, leaving the file at its temporary path.
    pub fn seal(mut self) -> Result<SealedGif> {
        if let Some(encoder) = self.encoder.take() {
            let mut writer = encoder.into_inner()?;
            writer.flush()?;
        }
        self.finished = true;
        Ok(SealedGif {
            path: self.path.clone(),
            tmp_path: self.tmp_path.clone(),
            committed: false,
        })
    }

    /// Seal and move the file to its final path.
    pub fn finish(self) -> Result<PathBuf> {
        self.seal()?.commit()
    }
}

/// A complete GIF still at its temporary path.
pub struct SealedGif {
    path: PathBuf,
    tmp_path: PathBuf,
    committed: bool,
}

impl SealedGif {
    pub fn commit(mut self) -> Result<PathBuf> {
        std::fs::rename(&self.tmp_path, &self.path)?;
        self.committed = true;
        Ok(self.path.clone())
    }
}

impl Drop for SealedGif {
    fn drop(&mut self) {
        if !self.committed {
            remove_quietly(&self.tmp_path);
        }
    }
}

/// Seal every sink, then commit them in order.
///
/// Nothing is renamed until all trailers are written. If a rename fails,
/// outputs already committed by this call are removed again, so either all
/// outputs appear or none do.
pub fn finish_all(sinks: Vec<GifSink>) -> Result<Vec<PathBuf>> {
    let sealed = sinks.into_iter().map(GifSink::seal).collect::<Result<Vec<_>>>()?;
    let mut committed = Vec::with_capacity(sealed.len());
    for gif in sealed {
        match gif.commit() {
            Ok(path) => committed.push(path),
            Err(e) => {
                for path in &committed {
                    remove_quietly(path);
                }
                return Err(e);
            }
        }
    }
    Ok(committed)
}

fn remove_quietly(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("could not remove {}: {e}", path.display()),
    }
}

impl Drop for GifSink {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        // Close the file before removing it.
        self.encoder.take();
        remove_quietly(&self.tmp_path);
    }
}

/// `out.gif` → `out.gif.tmp`
pub fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| OsString::from("output"));
    name.push(".tmp");
    path.with_file_name(name)
}

/// `out.gif` → `out.thumb.gif`
pub fn thumbnail_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_else(|| OsString::from("output"));
    let mut name = stem;
    name.push(".thumb");
    if let Some(ext) = path.extension() {
        name.push(".");
        name.push(ext);
    }
    path.with_file_name(name)
}
