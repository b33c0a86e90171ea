//! Placeholder-field substitution over the WordprocessingML body.
//!
//! A field is a paragraph containing `Client:`, `Date:` or `DATE:`. Word
//! freely splits text across runs (`<w:r>`) whenever formatting, spell-check
//! state or revision ids change, so markers are located on the paragraph's
//! concatenated text and mapped back onto the individual `<w:t>` segments.
//!
//! Two placements exist:
//!
//! * **In place**: the paragraph's trimmed text is exactly the marker. Only
//!   `<w:t>` text is rewritten; every run, its `<w:rPr>` (bold, italic,
//!   underline, size) and any drawing it carries stay where they are.
//! * **Split**: the marker shares its paragraph with other content. The
//!   marker is stripped from the original and the filled line goes into a
//!   new paragraph inserted right after it, using the original paragraph
//!   properties and the *first* run's properties. Which run "owned" the
//!   field is ambiguous once it is mixed with other text, so first-run
//!   formatting is the fallback. Images carried by the marker's runs move
//!   with the date so a signature stays beside it.
//!
//! Paragraphs are addressed by child-index paths from `<w:body>`. Inserting a
//! paragraph shifts later siblings, so date fields are edited from the end of
//! the document backwards and paths are re-collected between phases.

use crate::config::DateMarker;
use crate::pipeline::xml::{Element, Node};
use std::ops::Range;
use tracing::debug;

/// Client placeholder marker (case-sensitive).
pub const CLIENT_MARKER: &str = "Client:";

/// Label written in front of every filled date, whichever marker matched.
pub const DATE_LABEL: &str = "Date:";

/// Elements whose text is not part of the visible paragraph flow.
const SKIPPED: &[&str] = &[
    "w:pPr",
    "w:rPr",
    "w:drawing",
    "w:pict",
    "w:object",
    "w:del",
    "w:instrText",
    "mc:AlternateContent",
];

/// Run children that embed an image or other object.
const EMBEDDED: &[&str] = &["w:drawing", "w:pict", "w:object", "mc:AlternateContent"];

/// The values written into the fields.
#[derive(Debug, Clone, Copy)]
pub struct FieldValues<'a> {
    pub client: &'a str,
    pub date: &'a str,
}

/// Per-template field conventions.
#[derive(Debug, Clone, Copy)]
pub struct FieldRules {
    pub date_marker: DateMarker,
    /// How many date occurrences to fill, counted from the end of the document.
    pub date_fields: usize,
}

/// How a single field was filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    InPlace,
    Split,
}

/// What [`substitute`] changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Substitution {
    pub client: Option<Placement>,
    /// One entry per filled date field, in document order.
    pub dates: Vec<Placement>,
    /// Embedded objects moved into split date paragraphs.
    pub images_carried: usize,
    /// Whether the signature run was appended.
    pub stamped: bool,
}

#[derive(Debug, Clone)]
struct Segment {
    /// Path of the `<w:t>` (or tab/break) element from the paragraph.
    path: Vec<usize>,
    /// Path of the enclosing `<w:r>`, if any.
    run: Option<Vec<usize>>,
    start: usize,
    text: String,
    editable: bool,
}

impl Segment {
    fn end(&self) -> usize {
        self.start + self.text.len()
    }

    fn overlaps(&self, range: &Range<usize>) -> bool {
        self.start < range.end && self.end() > range.start
    }
}

struct FieldEdit {
    placement: Placement,
    /// Path of the paragraph that now holds the filled line.
    paragraph: Vec<usize>,
    images_carried: usize,
}

/// Fill the client and date fields of a `<w:document>` root in place.
///
/// `stamp`, when given, is a ready-made run appended to the last date field
/// (or to the last body paragraph if no date field exists).
pub fn substitute(
    root: &mut Element,
    values: &FieldValues<'_>,
    rules: &FieldRules,
    stamp: Option<Element>,
) -> Substitution {
    let mut result = Substitution::default();
    let Some(body) = root.child_mut("w:body") else {
        debug!("Document has no <w:body>; nothing to substitute");
        return result;
    };

    // ── Client ───────────────────────────────────────────────────────────
    let client_line = format!("{CLIENT_MARKER} {}", values.client);
    let client_path = paragraph_paths(body).into_iter().find(|path| {
        element_at(body, path)
            .map(|p| paragraph_text(p).contains(CLIENT_MARKER))
            .unwrap_or(false)
    });
    let mut client_filled = None;
    if let Some(path) = client_path {
        if let Some(edit) = fill_paragraph(body, &path, CLIENT_MARKER, &client_line, false) {
            debug!("Client field filled ({:?}) at {:?}", edit.placement, path);
            result.client = Some(edit.placement);
            client_filled = Some(edit.paragraph);
        }
    }

    // ── Dates (last N occurrences, edited back to front) ─────────────────
    let markers = rules.date_marker.markers();
    let date_fields: Vec<(Vec<usize>, &'static str)> = paragraph_paths(body)
        .into_iter()
        .rev()
        .filter(|path| client_filled.as_ref() != Some(path))
        .filter_map(|path| {
            let text = paragraph_text(element_at(body, &path)?);
            find_marker(&text, markers).map(|marker| (path, marker))
        })
        .take(rules.date_fields)
        .collect();

    let date_line = format!("{DATE_LABEL} {}", values.date);
    let mut stamp = stamp;
    for (path, marker) in &date_fields {
        let Some(edit) = fill_paragraph(body, path, marker, &date_line, true) else {
            continue;
        };
        debug!("Date field filled ({:?}) at {:?}", edit.placement, path);
        result.images_carried += edit.images_carried;
        // The first edited field is the last one in the document.
        if let Some(run) = stamp.take() {
            if let Some(p) = element_at_mut(body, &edit.paragraph) {
                p.children.push(Node::Element(run));
                result.stamped = true;
            }
        }
        result.dates.push(edit.placement);
    }
    result.dates.reverse();

    if let Some(run) = stamp {
        if let Some(path) = paragraph_paths(body).pop() {
            if let Some(p) = element_at_mut(body, &path) {
                p.children.push(Node::Element(run));
                result.stamped = true;
            }
        }
    }

    result
}

/// Visible text of every body paragraph, in document order.
pub fn paragraph_texts(root: &Element) -> Vec<String> {
    let Some(body) = root.child("w:body") else {
        return Vec::new();
    };
    paragraph_paths(body)
        .iter()
        .filter_map(|path| element_at(body, path))
        .map(paragraph_text)
        .collect()
}

/// Body paragraph elements, in document order.
pub fn paragraphs(root: &Element) -> Vec<&Element> {
    let Some(body) = root.child("w:body") else {
        return Vec::new();
    };
    paragraph_paths(body)
        .iter()
        .filter_map(|path| element_at(body, path))
        .collect()
}

/// Visible text of one paragraph (`w:tab` → `\t`, `w:br` → `\n`).
pub fn paragraph_text(p: &Element) -> String {
    collect_segments(p).0
}

fn find_marker(text: &str, markers: &[&'static str]) -> Option<&'static str> {
    markers
        .iter()
        .filter_map(|m| text.find(*m).map(|pos| (pos, *m)))
        .min_by_key(|(pos, _)| *pos)
        .map(|(_, m)| m)
}

fn fill_paragraph(
    body: &mut Element,
    path: &[usize],
    marker: &str,
    replacement: &str,
    carry_images: bool,
) -> Option<FieldEdit> {
    let (text, segments) = collect_segments(element_at(body, path)?);
    let start = text.find(marker)?;
    let marker_range = start..start + marker.len();
    let tail = &text[marker_range.end..];
    let end = marker_range.end + (tail.len() - tail.trim_start_matches(' ').len());

    if text.trim() == marker {
        let p = element_at_mut(body, path)?;
        replace_range(p, &segments, start..end, replacement);
        return Some(FieldEdit {
            placement: Placement::InPlace,
            paragraph: path.to_vec(),
            images_carried: 0,
        });
    }

    let mut marker_runs: Vec<Vec<usize>> = Vec::new();
    for seg in segments.iter().filter(|s| s.editable && s.overlaps(&marker_range)) {
        if let Some(ref run) = seg.run {
            if !marker_runs.contains(run) {
                marker_runs.push(run.clone());
            }
        }
    }

    let p = element_at_mut(body, path)?;
    replace_range(p, &segments, start..end, "");
    let images = if carry_images {
        take_embedded(p, &marker_runs)
    } else {
        Vec::new()
    };
    let images_carried = images.len();
    let new_paragraph = split_paragraph(p, replacement, images);

    let (&index, parent_path) = path.split_last()?;
    let parent = element_at_mut(body, parent_path)?;
    parent
        .children
        .insert(index + 1, Node::Element(new_paragraph));

    let mut paragraph = parent_path.to_vec();
    paragraph.push(index + 1);
    Some(FieldEdit {
        placement: Placement::Split,
        paragraph,
        images_carried,
    })
}

/// Rewrite the text covered by `range`, putting `replacement` into the first
/// overlapping segment and trimming the covered text from the others.
fn replace_range(p: &mut Element, segments: &[Segment], range: Range<usize>, replacement: &str) {
    let mut pending = Some(replacement);
    for seg in segments.iter().filter(|s| s.editable && s.overlaps(&range)) {
        let from = range.start.max(seg.start) - seg.start;
        let to = range.end.min(seg.end()) - seg.start;

        let mut text = String::with_capacity(seg.text.len() + replacement.len());
        text.push_str(&seg.text[..from]);
        if let Some(r) = pending.take() {
            text.push_str(r);
        }
        text.push_str(&seg.text[to..]);

        if let Some(t) = element_at_mut(p, &seg.path) {
            set_run_text(t, text);
        }
    }
}

fn set_run_text(t: &mut Element, text: String) {
    if text.starts_with(char::is_whitespace) || text.ends_with(char::is_whitespace) {
        t.set_attr("xml:space", "preserve");
    }
    t.set_text(text);
}

fn take_embedded(p: &mut Element, runs: &[Vec<usize>]) -> Vec<Element> {
    let mut taken = Vec::new();
    for run_path in runs {
        let Some(run) = element_at_mut(p, run_path) else {
            continue;
        };
        for node in std::mem::take(&mut run.children) {
            match node {
                Node::Element(e) if EMBEDDED.contains(&e.name.as_str()) => taken.push(e),
                other => run.children.push(other),
            }
        }
    }
    taken
}

fn split_paragraph(original: &Element, text: &str, embedded: Vec<Element>) -> Element {
    let mut p = Element::new("w:p");
    if let Some(ppr) = original.child("w:pPr") {
        let mut ppr = ppr.clone();
        // A section break belongs to the original paragraph only.
        ppr.children
            .retain(|n| !matches!(n, Node::Element(e) if e.is("w:sectPr")));
        p.children.push(Node::Element(ppr));
    }

    let mut run = Element::new("w:r");
    if let Some(rpr) = first_run(original).and_then(|r| r.child("w:rPr")) {
        run.children.push(Node::Element(rpr.clone()));
    }
    let mut t = Element::new("w:t");
    set_run_text(&mut t, text.to_string());
    run.children.push(Node::Element(t));
    run.children
        .extend(embedded.into_iter().map(Node::Element));

    p.children.push(Node::Element(run));
    p
}

fn first_run(p: &Element) -> Option<&Element> {
    for child in p.elements() {
        if child.is("w:r") {
            return Some(child);
        }
        if SKIPPED.contains(&child.name.as_str()) {
            continue;
        }
        if let Some(run) = first_run(child) {
            return Some(run);
        }
    }
    None
}

fn collect_segments(p: &Element) -> (String, Vec<Segment>) {
    let mut text = String::new();
    let mut segments = Vec::new();
    walk_segments(p, &mut Vec::new(), None, &mut text, &mut segments);
    (text, segments)
}

fn walk_segments(
    el: &Element,
    path: &mut Vec<usize>,
    run: Option<&[usize]>,
    text: &mut String,
    segments: &mut Vec<Segment>,
) {
    for (i, node) in el.children.iter().enumerate() {
        let Node::Element(child) = node else {
            continue;
        };
        path.push(i);
        let atom = match child.name.as_str() {
            "w:t" => Some((child.text(), true)),
            "w:tab" => Some(("\t".to_string(), false)),
            "w:br" | "w:cr" => Some(("\n".to_string(), false)),
            name if SKIPPED.contains(&name) => None,
            "w:r" => {
                let run_path = path.clone();
                walk_segments(child, path, Some(&run_path), text, segments);
                None
            }
            _ => {
                walk_segments(child, path, run, text, segments);
                None
            }
        };
        if let Some((s, editable)) = atom {
            segments.push(Segment {
                path: path.clone(),
                run: run.map(<[usize]>::to_vec),
                start: text.len(),
                text: s.clone(),
                editable,
            });
            text.push_str(&s);
        }
        path.pop();
    }
}

fn paragraph_paths(body: &Element) -> Vec<Vec<usize>> {
    let mut out = Vec::new();
    collect_paragraphs(body, &mut Vec::new(), &mut out);
    out
}

fn collect_paragraphs(el: &Element, path: &mut Vec<usize>, out: &mut Vec<Vec<usize>>) {
    for (i, node) in el.children.iter().enumerate() {
        let Node::Element(child) = node else {
            continue;
        };
        path.push(i);
        if child.is("w:p") {
            out.push(path.clone());
        } else if !child.is("w:sectPr") {
            // Tables, rows, cells, content controls …
            collect_paragraphs(child, path, out);
        }
        path.pop();
    }
}

fn element_at<'a>(root: &'a Element, path: &[usize]) -> Option<&'a Element> {
    path.iter()
        .try_fold(root, |el, &i| match el.children.get(i) {
            Some(Node::Element(e)) => Some(e),
            _ => None,
        })
}

fn element_at_mut<'a>(root: &'a mut Element, path: &[usize]) -> Option<&'a mut Element> {
    let mut el = root;
    for &i in path {
        el = match el.children.get_mut(i) {
            Some(Node::Element(e)) => e,
            _ => return None,
        };
    }
    Some(el)
}
