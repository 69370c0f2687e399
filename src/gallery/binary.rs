//! Stream-backed galleries: `.gal`, `.ut`, `.url` and `.json`.
//!
//! All four share one backend that owns a file (or a process stream) and
//! delegates record framing to a codec. Progress is the byte offset after
//! each record; the total size is the file length in bytes.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};

use tracing::{debug, warn};

use crate::codec::{framed, json, text, universal, Tracked};
use crate::core::{Block, Gallery, GalleryDescriptor, Mode, ModeGuard, Record};
use crate::util::{Error, Result};

/// Record framing of a stream gallery.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Framing {
    /// Literal binary dump.
    Gal,
    /// Universal templates.
    Universal,
    /// One URL per line.
    Url,
    /// One JSON object per line.
    Json,
}

impl Framing {
    fn read(self, r: &mut dyn BufRead) -> Result<Option<Record>> {
        match self {
            Self::Gal => framed::read_record(r),
            Self::Universal => universal::read_record(r),
            Self::Json => json::read_record(r),
            Self::Url => {
                let mut line = String::new();
                if r.read_line(&mut line)? == 0 {
                    return Ok(None);
                }
                Ok(Some(text::parse_url_line(&line)))
            }
        }
    }

    fn write(self, w: &mut dyn Write, record: &Record) -> Result<u64> {
        match self {
            Self::Gal => framed::write_record(w, record),
            Self::Universal => universal::write_record(w, record),
            Self::Json => json::write_record(w, record),
            Self::Url => match text::format_url_line(record) {
                Some(line) => {
                    w.write_all(line.as_bytes())?;
                    Ok(line.len() as u64)
                }
                None => Ok(0),
            },
        }
    }
}

/// Which process stream a descriptor names, if any.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum StdStream {
    In,
    Out,
    Err,
}

impl StdStream {
    fn of(descriptor: &GalleryDescriptor) -> Option<Self> {
        match descriptor.base_name() {
            "stdin" => Some(Self::In),
            "stdout" => Some(Self::Out),
            "stderr" => Some(Self::Err),
            _ => None,
        }
    }
}

struct Input {
    stream: Tracked<Box<dyn BufRead + Send>>,
    /// Pipes and process streams cannot restart.
    sequential: bool,
    len: u64,
}

struct Output {
    stream: Box<dyn Write + Send>,
    sequential: bool,
    written: u64,
}

/// Gallery over a byte stream with pluggable record framing.
pub struct BinaryGallery {
    descriptor: GalleryDescriptor,
    framing: Framing,
    block_size: usize,
    mode: ModeGuard,
    input: Option<Input>,
    output: Option<Output>,
    /// A sequential input reported `done`.
    exhausted: bool,
}

impl BinaryGallery {
    pub fn new(descriptor: GalleryDescriptor, framing: Framing) -> Result<Self> {
        Ok(Self {
            block_size: descriptor.block_size()?,
            descriptor,
            framing,
            mode: ModeGuard::new(),
            input: None,
            output: None,
            exhausted: false,
        })
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }

    fn open_input(&self) -> Result<Input> {
        match StdStream::of(&self.descriptor) {
            Some(StdStream::In) => Ok(Input {
                stream: Tracked::new(Box::new(BufReader::new(io::stdin()))),
                sequential: true,
                len: 0,
            }),
            Some(_) => Err(Error::NotSupported("reading from an output stream")),
            None => {
                let path = self.descriptor.path();
                let file = File::open(path).map_err(|e| Error::from_open(path, e))?;
                let meta = file.metadata()?;
                debug!("reading {} ({} bytes)", self.descriptor.name, meta.len());
                Ok(Input {
                    stream: Tracked::new(Box::new(BufReader::new(file))),
                    sequential: !meta.is_file(),
                    len: meta.len(),
                })
            }
        }
    }

    fn open_output(&self) -> Result<Output> {
        match StdStream::of(&self.descriptor) {
            Some(StdStream::Out) => Ok(Output {
                stream: Box::new(io::stdout()),
                sequential: true,
                written: 0,
            }),
            Some(StdStream::Err) => Ok(Output {
                stream: Box::new(io::stderr()),
                sequential: true,
                written: 0,
            }),
            Some(StdStream::In) => Err(Error::NotSupported("writing to stdin")),
            None => {
                let path = self.descriptor.path();
                if self.descriptor.get_bool("remove") {
                    match fs::remove_file(path) {
                        Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e.into()),
                        _ => {}
                    }
                }
                let parent = self.descriptor.parent();
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(&parent)?;
                }
                let append = self.descriptor.get_bool("append");
                let file = OpenOptions::new()
                    .write(true)
                    .create(true)
                    .append(append)
                    .truncate(!append)
                    .open(path)?;
                let sequential = !file.metadata()?.is_file();
                debug!("writing {} (append: {})", self.descriptor.name, append);
                Ok(Output {
                    stream: Box::new(BufWriter::new(file)),
                    sequential,
                    written: 0,
                })
            }
        }
    }
}

impl Gallery for BinaryGallery {
    fn descriptor(&self) -> &GalleryDescriptor {
        &self.descriptor
    }

    fn read_block(&mut self, max: usize) -> Result<Block> {
        self.mode.enter(Mode::Reading, &self.descriptor.name)?;
        if self.exhausted {
            return Ok(Block::finished());
        }
        if self.input.is_none() {
            self.input = Some(self.open_input()?);
        }

        let restart = match self.input.as_mut() {
            Some(input) => input.stream.at_end()? && !input.sequential && input.stream.pos() > 0,
            None => false,
        };
        if restart {
            debug!("restarting {}", self.descriptor.name);
            self.input = Some(self.open_input()?);
        }

        let framing = self.framing;
        let Some(input) = self.input.as_mut() else {
            return Ok(Block::finished());
        };

        let mut records = Vec::new();
        while records.len() < max && !input.stream.at_end()? {
            let Some(mut record) = framing.read(&mut input.stream)? else {
                break;
            };
            if !(record.is_empty() && record.is_null()) {
                record.set_progress(input.stream.pos());
                records.push(record);
            }
            if input.sequential {
                break;
            }
        }

        let done = input.stream.at_end()?;
        if done && input.sequential {
            self.exhausted = true;
        }
        Ok(Block::new(records, done))
    }

    fn write(&mut self, record: &Record) -> Result<()> {
        self.mode.enter(Mode::Writing, &self.descriptor.name)?;
        if self.output.is_none() {
            self.output = Some(self.open_output()?);
        }
        let framing = self.framing;
        if let Some(output) = self.output.as_mut() {
            output.written += framing.write(&mut output.stream, record)?;
            if output.sequential {
                output.stream.flush()?;
            }
        }
        Ok(())
    }

    fn total_size(&mut self) -> Result<u64> {
        if let Some(output) = &self.output {
            return Ok(output.written);
        }
        if self.input.is_none() {
            self.input = Some(self.open_input()?);
        }
        Ok(self.input.as_ref().map_or(0, |i| i.len))
    }

    fn position(&self) -> u64 {
        match (&self.input, &self.output) {
            (Some(input), _) => input.stream.pos(),
            (None, Some(output)) => output.written,
            (None, None) => 0,
        }
    }

    fn block_size(&self) -> usize {
        self.block_size
    }

    fn set_block_size(&mut self, size: usize) {
        self.block_size = size.max(1);
    }

    fn close(&mut self) -> Result<()> {
        if let Some(output) = self.output.as_mut() {
            output.stream.flush()?;
        }
        Ok(())
    }
}

impl Drop for BinaryGallery {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("failed to flush {}: {}", self.descriptor.name, e);
        }
    }
}

pub(crate) fn open_gal(d: &GalleryDescriptor) -> Result<Box<dyn Gallery>> {
    Ok(Box::new(BinaryGallery::new(d.clone(), Framing::Gal)?))
}

pub(crate) fn open_ut(d: &GalleryDescriptor) -> Result<Box<dyn Gallery>> {
    Ok(Box::new(BinaryGallery::new(d.clone(), Framing::Universal)?))
}

pub(crate) fn open_url(d: &GalleryDescriptor) -> Result<Box<dyn Gallery>> {
    Ok(Box::new(BinaryGallery::new(d.clone(), Framing::Url)?))
}

pub(crate) fn open_json(d: &GalleryDescriptor) -> Result<Box<dyn Gallery>> {
    Ok(Box::new(BinaryGallery::new(d.clone(), Framing::Json)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::Matrix;

    fn records(n: usize) -> Vec<Record> {
        (0..n)
            .map(|i| {
                Record::with_label(format!("img/{}.jpg", i), format!("s{}", i % 3))
                    .with_matrix(Matrix::from_bytes(vec![i as u8; 4]))
            })
            .collect()
    }

    fn write_all(descriptor: &GalleryDescriptor, framing: Framing, recs: &[Record]) {
        let mut g = BinaryGallery::new(descriptor.clone(), framing).unwrap();
        g.write_block(recs).unwrap();
        g.close().unwrap();
    }

    #[test]
    fn test_gal_blocks_and_restart() {
        let dir = tempfile::tempdir().unwrap();
        let d = GalleryDescriptor::new(dir.path().join("a.gal").to_string_lossy().to_string());
        let recs = records(7);
        write_all(&d, Framing::Gal, &recs);

        let mut g = BinaryGallery::new(d.clone(), Framing::Gal).unwrap();
        let total = g.total_size().unwrap();
        assert_eq!(total, fs::metadata(d.path()).unwrap().len());

        let mut calls = 0;
        let mut all = Vec::new();
        let mut last_progress = 0;
        loop {
            let block = g.read_block(3).unwrap();
            calls += 1;
            for r in &block.records {
                let p = r.progress().unwrap() as u64;
                assert!(p > last_progress);
                last_progress = p;
            }
            all.extend(block.records);
            if block.done {
                break;
            }
        }
        assert_eq!(calls, 3);
        assert_eq!(last_progress, total);
        assert_eq!(all.len(), 7);
        for (a, b) in all.iter().zip(&recs) {
            assert_eq!(a.name, b.name);
            assert_eq!(a.matrix, b.matrix);
        }

        // second pass starts over
        let again = g.read_block(100).unwrap();
        assert!(again.done);
        assert_eq!(again.len(), 7);
    }

    #[test]
    fn test_missing_source() {
        let mut g = BinaryGallery::new(GalleryDescriptor::new("/nonexistent/x.gal"), Framing::Gal).unwrap();
        assert!(matches!(g.read_block(10), Err(Error::MissingSource(_))));
    }

    #[test]
    fn test_mode_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let d = GalleryDescriptor::new(dir.path().join("m.gal").to_string_lossy().to_string());
        let mut g = BinaryGallery::new(d, Framing::Gal).unwrap();
        g.write(&records(1)[0]).unwrap();
        assert!(matches!(g.read_block(1), Err(Error::ModeConflict(_))));
    }

    #[test]
    fn test_append_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/u.url").to_string_lossy().to_string();
        let d = GalleryDescriptor::new(path.clone());
        write_all(&d, Framing::Url, &records(2));
        write_all(&d.clone().with("append", true), Framing::Url, &records(1));

        let mut g = BinaryGallery::new(d.clone(), Framing::Url).unwrap();
        let all = g.read_all().unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[2].metadata.get_string("URL").as_deref(), Some("img/0.jpg"));

        write_all(&d.clone().with("remove", true), Framing::Url, &records(1));
        let mut g = BinaryGallery::new(d, Framing::Url).unwrap();
        assert_eq!(g.read_all().unwrap().len(), 1);
    }

    #[test]
    fn test_json_gallery() {
        let dir = tempfile::tempdir().unwrap();
        let d = GalleryDescriptor::new(dir.path().join("r.json").to_string_lossy().to_string());
        let recs: Vec<Record> = records(3).into_iter().map(|mut r| { r.strip_matrix(); r }).collect();
        write_all(&d, Framing::Json, &recs);

        let mut g = BinaryGallery::new(d, Framing::Json).unwrap();
        let back = g.read_all().unwrap();
        assert_eq!(back.len(), 3);
        assert_eq!(back[1].name, "img/1.jpg");
        assert_eq!(back[1].label().as_deref(), Some("s1"));
    }

    #[cfg(unix)]
    #[test]
    fn test_pipe_is_read_once() {
        let dir = tempfile::tempdir().unwrap();
        let file = GalleryDescriptor::new(dir.path().join("src.gal").to_string_lossy().to_string());
        write_all(&file, Framing::Gal, &records(3));
        let bytes = fs::read(file.path()).unwrap();

        let fifo = dir.path().join("pipe.gal");
        let status = std::process::Command::new("mkfifo").arg(&fifo).status().unwrap();
        assert!(status.success());
        let feeder = {
            let fifo = fifo.clone();
            std::thread::spawn(move || fs::write(fifo, bytes).unwrap())
        };

        let d = GalleryDescriptor::new(fifo.to_string_lossy().to_string());
        let mut g = BinaryGallery::new(d, Framing::Gal).unwrap();
        let blocks: Vec<(usize, bool)> = (0..6)
            .map(|_| {
                let b = g.read_block(100).unwrap();
                (b.len(), b.done)
            })
            .collect();
        feeder.join().unwrap();
        assert_eq!(
            blocks,
            vec![(1, false), (1, false), (1, true), (0, true), (0, true), (0, true)]
        );
    }

    #[test]
    fn test_empty_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let d = GalleryDescriptor::new(file.path().to_string_lossy().to_string());
        let mut g = BinaryGallery::new(d, Framing::Gal).unwrap();
        let block = g.read_block(10).unwrap();
        assert!(block.done);
        assert!(block.is_empty());
    }
}
