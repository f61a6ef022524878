//! murus-io — PLY (ASCII) and LAS readers, PLY writers for the published
//! clouds and the CSV histogram table.

use anyhow::{bail, Context, Result};
use las::Read;
use log::debug;
use murus_core::{Cloud, DamageCloud, HistogramCloud};
use ply_rs::parser::Parser;
use ply_rs::ply::{DefaultElement, Ply, Property};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

pub fn read_las(path: &Path) -> Result<Cloud> {
    let mut r = las::Reader::from_path(path).with_context(|| format!("open {}", path.display()))?;
    let hdr = r.header().clone();
    let has_color = hdr.point_format().has_color;

    let mut c = Cloud::default();
    c.reserve(hdr.number_of_points() as usize);
    let mut intensity = Vec::new();
    let (mut red, mut green, mut blue) = (Vec::new(), Vec::new(), Vec::new());

    for rec in r.points() {
        let p = rec?; // las::Point
        // x/y/z are f64 with scale/offset already applied by Reader
        c.push(p.x as f32, p.y as f32, p.z as f32);
        intensity.push(p.intensity as f32);
        if has_color {
            let (cr, cg, cb) = p.color.map(|col| (col.red, col.green, col.blue)).unwrap_or((0, 0, 0));
            red.push(cr as f32);
            green.push(cg as f32);
            blue.push(cb as f32);
        }
    }

    c.attrs_f32.insert("intensity".into(), intensity);
    if has_color {
        c.attrs_f32.insert("red".into(), red);
        c.attrs_f32.insert("green".into(), green);
        c.attrs_f32.insert("blue".into(), blue);
    }
    Ok(c)
}

pub fn read_ply_ascii(path: &Path) -> Result<Cloud> {
    let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut reader = BufReader::new(f);
    let parser = Parser::<DefaultElement>::new();
    let ply: Ply<DefaultElement> = parser.read_ply(&mut reader)?;

    // Expect "vertex" element with float x,y,z.
    let vertex = ply.payload.get("vertex")
        .ok_or_else(|| anyhow::anyhow!("PLY missing 'vertex' element"))?;

    let mut c = Cloud::default();
    c.reserve(vertex.len());

    // extra scalar properties declared on the first vertex become attribute columns
    let extra: Vec<String> = vertex
        .first()
        .map(|el| {
            el.keys()
                .filter(|k| !matches!(k.as_str(), "x" | "y" | "z"))
                .filter(|k| get_f32(el, k).is_ok())
                .cloned()
                .collect()
        })
        .unwrap_or_default();
    for k in &extra {
        c.attrs_f32.insert(k.clone(), Vec::with_capacity(vertex.len()));
    }

    for el in vertex {
        c.push(get_f32(el, "x")?, get_f32(el, "y")?, get_f32(el, "z")?);
        for k in &extra {
            let val = get_f32(el, k).unwrap_or(0.0);
            if let Some(col) = c.attrs_f32.get_mut(k) {
                col.push(val);
            }
        }
    }
    debug!("read {} points ({} attributes) from {}", c.len(), extra.len(), path.display());
    Ok(c)
}

fn get_f32(el: &DefaultElement, key: &str) -> Result<f32> {
    match el.get(key) {
        Some(Property::Float(v)) => Ok(*v),
        Some(Property::Double(v)) => Ok(*v as f32),
        Some(Property::UChar(v)) => Ok(*v as f32),
        Some(Property::Char(v)) => Ok(*v as f32),
        Some(Property::UShort(v)) => Ok(*v as f32),
        Some(Property::Short(v)) => Ok(*v as f32),
        Some(Property::UInt(v)) => Ok(*v as f32),
        Some(Property::Int(v)) => Ok(*v as f32),
        Some(_) => bail!("property '{}' not float-like", key),
        None => bail!("missing property '{}'", key),
    }
}

pub fn read_auto(path: &Path) -> Result<Cloud> {
    let lower = path.to_string_lossy().to_ascii_lowercase();
    if lower.ends_with(".las") {
        return read_las(path);
    }
    if lower.ends_with(".ply") {
        return read_ply_ascii(path);
    }
    // fallback: try PLY and report clearly
    match read_ply_ascii(path) {
        Ok(c) => Ok(c),
        Err(e) => Err(anyhow::anyhow!("Unsupported file (expected .ply or .las). Root error: {e}")),
    }
}

/// Header for an ASCII PLY with one "vertex" element.
fn write_header<W: Write>(w: &mut W, n: usize, props: &[(&str, String)]) -> std::io::Result<()> {
    writeln!(w, "ply")?;
    writeln!(w, "format ascii 1.0")?;
    writeln!(w, "element vertex {}", n)?;
    writeln!(w, "property float x")?;
    writeln!(w, "property float y")?;
    writeln!(w, "property float z")?;
    for (ty, name) in props {
        writeln!(w, "property {} {}", ty, name)?;
    }
    writeln!(w, "end_header")
}

fn create(path: &Path) -> Result<BufWriter<File>> {
    let f = File::create(path).with_context(|| format!("create {}", path.display()))?;
    Ok(BufWriter::new(f))
}

pub fn write_ply_ascii(path: &Path, cloud: &Cloud) -> Result<()> {
    let n = cloud.len();
    let mut w = create(path)?;

    // stable, nice order: colors first then the rest alpha-sorted
    let keys = cloud.aligned_attrs();
    let mut ordered: Vec<&str> = Vec::new();
    for k in ["red", "green", "blue"] {
        if keys.binary_search(&k).is_ok() { ordered.push(k); }
    }
    for k in keys {
        if !ordered.iter().any(|&ok| ok == k) {
            ordered.push(k);
        }
    }

    let props: Vec<(&str, String)> = ordered.iter().map(|k| ("float", k.to_string())).collect();
    write_header(&mut w, n, &props)?;
    for i in 0..n {
        write!(w, "{} {} {}", cloud.x[i], cloud.y[i], cloud.z[i])?;
        for k in &ordered {
            write!(w, " {}", cloud.attrs_f32[*k][i])?;
        }
        writeln!(w)?;
    }
    w.flush()?;
    Ok(())
}

/// Damage cloud as x y z dist_offset angle_offset.
pub fn write_damage_ply(path: &Path, damage: &DamageCloud) -> Result<()> {
    let mut w = create(path)?;
    let props = [("float", "dist_offset".to_string()), ("float", "angle_offset".to_string())];
    write_header(&mut w, damage.len(), &props)?;
    for (p, d) in damage.iter() {
        writeln!(w, "{} {} {} {} {}", p[0], p[1], p[2], d.dist_offset, d.angle_offset)?;
    }
    w.flush()?;
    Ok(())
}

/// Histogram cloud as x y z h0 .. h{len-1}.
pub fn write_histogram_ply(path: &Path, hists: &HistogramCloud) -> Result<()> {
    let len = histogram_len(hists)?;
    let mut w = create(path)?;
    let props: Vec<(&str, String)> = (0..len).map(|j| ("uint", format!("h{j}"))).collect();
    write_header(&mut w, hists.len(), &props)?;
    for (p, h) in hists.iter() {
        write!(w, "{} {} {}", p[0], p[1], p[2])?;
        for c in &h.counts {
            write!(w, " {}", c)?;
        }
        writeln!(w)?;
    }
    w.flush()?;
    Ok(())
}

fn histogram_len(hists: &HistogramCloud) -> Result<usize> {
    let len = hists.data.first().map(|h| h.len()).unwrap_or(0);
    if let Some((i, h)) = hists.data.iter().enumerate().find(|(_, h)| h.len() != len) {
        bail!("histogram {} has {} bins, expected {}", i, h.len(), len);
    }
    Ok(len)
}

/// Tabular dump: one descriptive line, then one row of `len` counts per anchor.
pub fn write_histogram_table<W: Write>(w: &mut W, hists: &HistogramCloud) -> Result<()> {
    let len = histogram_len(hists)?;
    writeln!(w, "# wall damage histograms: {} anchors x {} bins", hists.len(), len)?;
    for h in &hists.data {
        let row: Vec<String> = h.counts.iter().map(|c| c.to_string()).collect();
        writeln!(w, "{}", row.join(", "))?;
    }
    Ok(())
}

pub fn write_histogram_csv(path: &Path, hists: &HistogramCloud) -> Result<()> {
    let mut w = create(path)?;
    write_histogram_table(&mut w, hists)?;
    w.flush()?;
    Ok(())
}
