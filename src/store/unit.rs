//! The filesystem-backed unit store: two data files and the read paths over
//! them.
//!
//! `def.dat` holds the unit's defs in import order; `ref.dat` holds the refs
//! sorted by `(file, start, end)` so all refs of one file occupy one
//! contiguous run. Writers record where every record starts, which is what
//! the indices are built from. Readers either scan a whole file or seek to
//! known offsets; on filesystems with a fetch capability the byte range is
//! pre-staged before the seek.
//!
//! This store is typically wrapped by an [`IndexedUnitStore`], which serves
//! indexed queries and passes everything else through to these scans.
//!
//! [`IndexedUnitStore`]: super::IndexedUnitStore

use std::io::{BufReader, BufWriter, Read, SeekFrom, Write};
use std::sync::Arc;
use tracing::debug;

use crate::codec::{Decoder, Encoder};
use crate::error::{Error, Result};
use crate::filter::{self, Filter};
use crate::graph::{clean_for_import, Def, GraphOutput, Ref, UnitId};
use crate::offsets::{ByteOffsets, ByteRanges, FileByteRanges};
use crate::vfs::{FileSystem, VfsFile};

pub const UNIT_DEFS_FILE: &str = "def.dat";
pub const UNIT_REFS_FILE: &str = "ref.dat";

/// Size guesses for a single encoded record, used as the fetch pre-warm
/// window for offset-driven reads. Fetch-capable filesystems stage at least
/// this much; decoding still reads exactly one frame.
const DEF_BYTE_ESTIMATE: i64 = 5000;
const REF_BYTE_ESTIMATE: i64 = 500;

pub struct FsUnitStore {
    /// The unit's own directory; data files and indexes live at its root.
    fs: Arc<dyn FileSystem>,
    unit: UnitId,
}

impl FsUnitStore {
    pub fn new(fs: Arc<dyn FileSystem>, unit: UnitId) -> Self {
        Self { fs, unit }
    }

    pub fn unit_id(&self) -> &UnitId {
        &self.unit
    }

    fn open_data(&self, name: &str) -> Result<Box<dyn VfsFile>> {
        match self.fs.open(name) {
            Err(e) if e.is_not_exist() => Err(Error::NotInitialized),
            other => other,
        }
    }

    fn open_data_fetcher(&self, name: &str) -> Result<Box<dyn VfsFile>> {
        match self.fs.open_fetcher(name) {
            Err(e) if e.is_not_exist() => Err(Error::NotInitialized),
            other => other,
        }
    }

    /// Restores the context the import cleaning stripped.
    fn fill_def(&self, def: &mut Def) {
        def.unit_type = self.unit.unit_type.clone();
        def.unit = self.unit.name.clone();
    }

    fn fill_ref(&self, r: &mut Ref) {
        r.unit_type = self.unit.unit_type.clone();
        r.unit = self.unit.name.clone();
        if r.def_unit_type.is_empty() {
            r.def_unit_type = self.unit.unit_type.clone();
        }
        if r.def_unit.is_empty() {
            r.def_unit = self.unit.name.clone();
        }
    }

    /// Scans the whole def file, applying the filters.
    pub fn defs(&self, filters: &[Filter]) -> Result<Vec<Def>> {
        let file = self.open_data(UNIT_DEFS_FILE)?;
        let mut dec = Decoder::new(BufReader::new(file));
        let mut defs = Vec::new();
        while let Some((mut def, _)) = dec.decode::<Def>()? {
            self.fill_def(&mut def);
            if filter::select_def(filters, &def) {
                defs.push(def);
            }
        }
        debug!(unit = %self.unit, count = defs.len(), "scanned defs");
        Ok(defs)
    }

    /// Reads one def per offset.
    pub fn defs_at_offsets(&self, ofs: &[i64], filters: &[Filter]) -> Result<Vec<Def>> {
        if ofs.is_empty() {
            return Ok(Vec::new());
        }
        let mut file = self.open_data_fetcher(UNIT_DEFS_FILE)?;
        let mut defs = Vec::with_capacity(ofs.len());
        for &o in ofs {
            seek_range(&mut file, o, DEF_BYTE_ESTIMATE)?;
            let mut dec = Decoder::new(&mut file);
            let Some((mut def, _)) = dec.decode::<Def>()? else {
                return Err(crate::corrupt!("def offset {o} is past end of file"));
            };
            self.fill_def(&mut def);
            if filter::select_def(filters, &def) {
                defs.push(def);
            }
        }
        debug!(unit = %self.unit, offsets = ofs.len(), count = defs.len(), "read defs at offsets");
        Ok(defs)
    }

    /// Scans the whole ref file, applying the filters.
    pub fn refs(&self, filters: &[Filter]) -> Result<Vec<Ref>> {
        let file = self.open_data(UNIT_REFS_FILE)?;
        let mut dec = Decoder::new(BufReader::new(file));
        let mut refs = Vec::new();
        while let Some((mut r, _)) = dec.decode::<Ref>()? {
            self.fill_ref(&mut r);
            if filter::select_ref(filters, &r) {
                refs.push(r);
            }
        }
        debug!(unit = %self.unit, count = refs.len(), "scanned refs");
        Ok(refs)
    }

    /// Reads one ref per offset.
    pub fn refs_at_offsets(&self, ofs: &[i64], filters: &[Filter]) -> Result<Vec<Ref>> {
        if ofs.is_empty() {
            return Ok(Vec::new());
        }
        let mut file = self.open_data_fetcher(UNIT_REFS_FILE)?;
        let mut refs = Vec::with_capacity(ofs.len());
        for &o in ofs {
            seek_range(&mut file, o, REF_BYTE_ESTIMATE)?;
            let mut dec = Decoder::new(&mut file);
            let Some((mut r, _)) = dec.decode::<Ref>()? else {
                return Err(crate::corrupt!("ref offset {o} is past end of file"));
            };
            self.fill_ref(&mut r);
            if filter::select_ref(filters, &r) {
                refs.push(r);
            }
        }
        Ok(refs)
    }

    /// Reads the refs covered by each byte range with one contiguous read
    /// per range.
    pub fn refs_at_byte_ranges(
        &self,
        ranges: &[ByteRanges],
        filters: &[Filter],
    ) -> Result<Vec<Ref>> {
        if ranges.is_empty() {
            return Ok(Vec::new());
        }
        let mut file = self.open_data_fetcher(UNIT_REFS_FILE)?;
        let mut refs = Vec::new();
        for br in ranges {
            seek_range(&mut file, br.start(), br.byte_len())?;
            let mut buf = vec![0u8; br.byte_len() as usize];
            file.read_exact(&mut buf)
                .map_err(|e| crate::corrupt!("short read of ref byte range: {e}"))?;
            let mut dec = Decoder::new(buf.as_slice());
            for _ in 0..br.count() {
                let Some((mut r, _)) = dec.decode::<Ref>()? else {
                    return Err(crate::corrupt!("ref byte range ended mid-record"));
                };
                self.fill_ref(&mut r);
                if filter::select_ref(filters, &r) {
                    refs.push(r);
                }
            }
        }
        debug!(unit = %self.unit, ranges = ranges.len(), count = refs.len(), "read refs at byte ranges");
        Ok(refs)
    }

    /// Reads all defs raw (no context fill) along with the starting offset
    /// of each. Used for index construction.
    pub fn read_defs(&self) -> Result<(Vec<Def>, ByteOffsets)> {
        let file = self.open_data(UNIT_DEFS_FILE)?;
        let mut dec = Decoder::new(BufReader::new(file));
        let mut defs = Vec::new();
        let mut ofs = ByteOffsets::new();
        let mut o = 0i64;
        while let Some((def, n)) = dec.decode::<Def>()? {
            ofs.push(o);
            defs.push(def);
            o += n as i64;
        }
        Ok((defs, ofs))
    }

    /// Reads all refs raw along with their per-file byte ranges and starting
    /// offsets. Used for index construction.
    pub fn read_refs(&self) -> Result<(Vec<Ref>, FileByteRanges, ByteOffsets)> {
        let file = self.open_data(UNIT_REFS_FILE)?;
        let mut dec = Decoder::new(BufReader::new(file));
        let mut refs = Vec::new();
        let mut fbr = FileByteRanges::new();
        let mut ofs = ByteOffsets::new();
        let mut o = 0i64;
        let mut last_file = String::new();
        while let Some((r, n)) = dec.decode::<Ref>()? {
            ofs.push(o);
            if r.file != last_file {
                fbr.insert(r.file.clone(), ByteRanges(vec![o]));
                last_file = r.file.clone();
            }
            if let Some(br) = fbr.get_mut(&r.file) {
                br.0.push(n as i64);
            }
            refs.push(r);
            o += n as i64;
        }
        Ok((refs, fbr, ofs))
    }

    /// Writes the def file, returning the starting offset of each record.
    /// Defs keep their input order.
    pub fn write_defs(&self, defs: &[Def]) -> Result<ByteOffsets> {
        debug!(unit = %self.unit, count = defs.len(), "writing defs");
        let mut w = BufWriter::new(self.fs.create(UNIT_DEFS_FILE)?);
        let mut ofs = ByteOffsets::with_capacity(defs.len());
        {
            let mut enc = Encoder::new(&mut w);
            let mut o = 0u64;
            for def in defs {
                ofs.push(o as i64);
                o += enc.encode(def)?;
            }
        }
        w.flush()?;
        Ok(ofs)
    }

    /// Sorts the refs by `(file, start, end)` and writes the ref file,
    /// returning the per-file byte ranges and the starting offset of each
    /// record.
    pub fn write_refs(&self, refs: &mut [Ref]) -> Result<(FileByteRanges, ByteOffsets)> {
        debug!(unit = %self.unit, count = refs.len(), "writing refs");
        refs.sort_by(|a, b| (&a.file, a.start, a.end).cmp(&(&b.file, b.start, b.end)));

        let mut w = BufWriter::new(self.fs.create(UNIT_REFS_FILE)?);
        let mut fbr = FileByteRanges::new();
        let mut ofs = ByteOffsets::with_capacity(refs.len());
        {
            let mut enc = Encoder::new(&mut w);
            let mut o = 0u64;
            let mut last_file = String::new();
            for r in refs.iter() {
                ofs.push(o as i64);
                if r.file != last_file {
                    fbr.insert(r.file.clone(), ByteRanges(vec![o as i64]));
                    last_file = r.file.clone();
                }
                let n = enc.encode(r)?;
                if let Some(br) = fbr.get_mut(&r.file) {
                    br.0.push(n as i64);
                }
                o += n;
            }
        }
        w.flush()?;
        Ok((fbr, ofs))
    }

    /// Cleans and writes one unit's graph data.
    pub fn import(&self, mut data: GraphOutput) -> Result<()> {
        clean_for_import(&mut data, "", &self.unit.unit_type, &self.unit.name);
        self.write_defs(&data.defs)?;
        self.write_refs(&mut data.refs)?;
        Ok(())
    }
}

/// Pre-stages `[start, start+len)` where the filesystem supports it, then
/// positions the file at `start`.
fn seek_range(file: &mut Box<dyn VfsFile>, start: i64, len: i64) -> Result<()> {
    file.fetch(start as u64, (start + len) as u64)?;
    file.seek(SeekFrom::Start(start as u64))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::MemFs;

    fn store() -> (MemFs, FsUnitStore) {
        let fs = MemFs::new();
        let store = FsUnitStore::new(Arc::new(fs.clone()), UnitId::new("t", "u"));
        (fs, store)
    }

    fn def(path: &str, name: &str) -> Def {
        Def {
            path: path.into(),
            name: name.into(),
            ..Def::default()
        }
    }

    fn file_ref(file: &str, start: u32) -> Ref {
        Ref {
            def_path: "p".into(),
            file: file.into(),
            start,
            end: start + 1,
            ..Ref::default()
        }
    }

    #[test]
    fn test_uninitialized_reads() {
        let (_fs, store) = store();
        let err = store.defs(&[]).unwrap_err();
        assert!(err.is_not_exist());
        let err = store.refs(&[]).unwrap_err();
        assert!(err.is_not_exist());
    }

    #[test]
    fn test_import_roundtrip_and_context_fill() {
        let (_fs, store) = store();
        let data = GraphOutput {
            defs: vec![def("p", "n")],
            refs: vec![Ref {
                def_path: "p".into(),
                file: "f".into(),
                start: 1,
                end: 2,
                ..Ref::default()
            }],
        };
        store.import(data).unwrap();

        let defs = store.defs(&[]).unwrap();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].path, "p");
        assert_eq!(defs[0].name, "n");
        assert_eq!(defs[0].unit_type, "t");
        assert_eq!(defs[0].unit, "u");

        let refs = store.refs(&[]).unwrap();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].unit_type, "t");
        assert_eq!(refs[0].unit, "u");
        // Intra-unit target recovered from context.
        assert_eq!(refs[0].def_unit_type, "t");
        assert_eq!(refs[0].def_unit, "u");
    }

    #[test]
    fn test_write_defs_offsets_match_encoded_lengths() {
        let (_fs, store) = store();
        let defs = vec![def("a", "A"), def("bb", "BB"), def("ccc", "CCC")];
        let ofs = store.write_defs(&defs).unwrap();
        assert_eq!(ofs[0], 0);

        let (read, read_ofs) = store.read_defs().unwrap();
        assert_eq!(read, defs);
        assert_eq!(read_ofs, ofs);

        // Each gap equals the encoded length reported by the codec.
        let mut buf = Vec::new();
        let mut enc = Encoder::new(&mut buf);
        for (i, d) in defs.iter().enumerate() {
            let n = enc.encode(d).unwrap() as i64;
            if i + 1 < ofs.len() {
                assert_eq!(ofs[i + 1] - ofs[i], n);
            }
        }
    }

    #[test]
    fn test_write_refs_sorts_and_groups_by_file() {
        let (_fs, store) = store();
        let mut refs = vec![
            file_ref("f2", 9),
            file_ref("f1", 5),
            file_ref("f2", 3),
            file_ref("f1", 1),
        ];
        let (fbr, ofs) = store.write_refs(&mut refs).unwrap();
        assert_eq!(ofs.len(), 4);
        assert_eq!(fbr.len(), 2);
        assert_eq!(fbr["f1"].count(), 2);
        assert_eq!(fbr["f2"].count(), 2);
        assert_eq!(fbr["f1"].start(), 0);
        assert_eq!(fbr["f2"].start(), fbr["f1"].byte_len());

        let read = store.refs(&[]).unwrap();
        let order: Vec<(String, u32)> =
            read.iter().map(|r| (r.file.clone(), r.start)).collect();
        assert_eq!(
            order,
            vec![
                ("f1".to_string(), 1),
                ("f1".to_string(), 5),
                ("f2".to_string(), 3),
                ("f2".to_string(), 9),
            ]
        );

        let (_, read_fbr, read_ofs) = store.read_refs().unwrap();
        assert_eq!(read_fbr, fbr);
        assert_eq!(read_ofs, ofs);
    }

    #[test]
    fn test_refs_at_byte_ranges_returns_exactly_one_file() {
        let (fs, store) = store();
        let mut refs: Vec<Ref> = (0..1000)
            .map(|i| file_ref(&format!("f{}", i % 10), i as u32))
            .collect();
        let (fbr, _) = store.write_refs(&mut refs).unwrap();

        fs.take_fetches();
        let got = store
            .refs_at_byte_ranges(std::slice::from_ref(&fbr["f5"]), &[])
            .unwrap();
        assert_eq!(got.len(), 100);
        assert!(got.iter().all(|r| r.file == "f5"));
        assert!(got.windows(2).all(|w| w[0].start <= w[1].start));

        // One contiguous fetch for the whole range.
        let fetches = fs.take_fetches();
        assert_eq!(fetches.len(), 1);
        assert_eq!(fetches[0].start, fbr["f5"].start() as u64);
        assert_eq!(
            fetches[0].end,
            (fbr["f5"].start() + fbr["f5"].byte_len()) as u64
        );
    }

    #[test]
    fn test_defs_at_offsets_fetches_estimate_window() {
        let (fs, store) = store();
        let defs: Vec<Def> = (0..20).map(|i| def(&format!("p{i}"), "N")).collect();
        let ofs = store.write_defs(&defs).unwrap();

        fs.take_fetches();
        let got = store.defs_at_offsets(&[ofs[17]], &[]).unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].path, "p17");

        let fetches = fs.take_fetches();
        assert_eq!(fetches.len(), 1);
        assert_eq!(fetches[0].start, ofs[17] as u64);
        assert_eq!(fetches[0].end, (ofs[17] + DEF_BYTE_ESTIMATE) as u64);
    }

    #[test]
    fn test_refs_at_offsets() {
        let (_fs, store) = store();
        let mut refs = vec![file_ref("f1", 1), file_ref("f1", 2), file_ref("f2", 3)];
        let (_, ofs) = store.write_refs(&mut refs).unwrap();

        let got = store.refs_at_offsets(&[ofs[2]], &[]).unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].file, "f2");
    }

    #[test]
    fn test_scan_applies_filters() {
        let (_fs, store) = store();
        let data = GraphOutput {
            defs: vec![def("p1", "Foo"), def("p2", "Bar")],
            refs: vec![file_ref("f1", 1), file_ref("f2", 2)],
        };
        store.import(data).unwrap();

        let defs = store.defs(&[Filter::ByDefPath("p2".into())]).unwrap();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "Bar");

        let refs = store.refs(&[Filter::ByFiles(vec!["f1".into()])]).unwrap();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].file, "f1");
    }
}
