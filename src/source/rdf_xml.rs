//! RDF/XML reader producing an in-memory triple [`Graph`].
//!
//! Covers the RDF/XML used by SPDX documents: typed node elements,
//! `rdf:Description`, `rdf:about` / `rdf:ID` / `rdf:nodeID`, `rdf:resource`,
//! nested node elements, property attributes and `rdf:parseType="Resource"`
//! and `"Literal"`. Collections and reification are not supported.

use std::collections::{HashMap, HashSet};

use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{LocalName, Namespace, ResolveResult};
use quick_xml::reader::NsReader;
use tracing::warn;

use crate::error::{NoticeError, Result};

pub const RDF_NS: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";

const KIND: &str = "RDF/XML";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Term {
    Iri(String),
    Blank(String),
    Literal(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Triple {
    pub subject: Term,
    pub predicate: String,
    pub object: Term,
}

/// Parsed triples, indexed by subject and predicate and by type.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    triples: Vec<Triple>,
    /// subject → predicate → objects, in document order
    index: HashMap<Term, HashMap<String, Vec<Term>>>,
    /// type IRI → distinct subjects, in document order
    by_type: HashMap<String, Vec<Term>>,
}

impl Graph {
    pub fn parse(xml: &str) -> Result<Graph> {
        Parser::new(xml).run().map(Graph::build)
    }

    #[cfg(test)]
    pub fn from_triples(triples: Vec<Triple>) -> Self {
        Graph::build(triples)
    }

    fn build(triples: Vec<Triple>) -> Graph {
        let mut index: HashMap<Term, HashMap<String, Vec<Term>>> = HashMap::new();
        let mut by_type: HashMap<String, Vec<Term>> = HashMap::new();
        let mut typed: HashSet<(&str, &Term)> = HashSet::new();

        for t in &triples {
            index
                .entry(t.subject.clone())
                .or_default()
                .entry(t.predicate.clone())
                .or_default()
                .push(t.object.clone());

            if let (RDF_TYPE, Term::Iri(type_iri)) = (t.predicate.as_str(), &t.object) {
                if typed.insert((type_iri.as_str(), &t.subject)) {
                    by_type
                        .entry(type_iri.clone())
                        .or_default()
                        .push(t.subject.clone());
                }
            }
        }
        drop(typed);

        Graph {
            triples,
            index,
            by_type,
        }
    }

    pub fn triples(&self) -> &[Triple] {
        &self.triples
    }

    /// Distinct subjects carrying `rdf:type <type_iri>`, in document order.
    pub fn subjects_of_type(&self, type_iri: &str) -> Vec<&Term> {
        self.by_type
            .get(type_iri)
            .map(|subjects| subjects.iter().collect())
            .unwrap_or_default()
    }

    pub fn objects(&self, subject: &Term, predicate: &str) -> std::slice::Iter<'_, Term> {
        self.index
            .get(subject)
            .and_then(|predicates| predicates.get(predicate))
            .map(Vec::as_slice)
            .unwrap_or(&[])
            .iter()
    }

    pub fn has_predicate(&self, subject: &Term, predicate: &str) -> bool {
        self.objects(subject, predicate).next().is_some()
    }

    /// Type IRIs of `subject`.
    pub fn types<'a>(&'a self, subject: &Term) -> impl Iterator<Item = &'a str> + 'a {
        self.objects(subject, RDF_TYPE).filter_map(|o| match o {
            Term::Iri(iri) => Some(iri.as_str()),
            _ => None,
        })
    }
}

enum Frame {
    Root,
    Node {
        subject: Term,
    },
    Property {
        subject: Term,
        predicate: String,
        text: String,
        /// Object already emitted (resource reference or nested node).
        filled: bool,
        /// `rdf:parseType="Literal"`: nested markup contributes its text.
        literal_xml: bool,
    },
    Skip,
}

#[derive(Default)]
struct Attrs {
    about: Option<String>,
    id: Option<String>,
    node_id: Option<String>,
    resource: Option<String>,
    parse_type: Option<String>,
    rdf_type: Option<String>,
    properties: Vec<(String, String)>,
}

struct Parser<'x> {
    reader: NsReader<&'x [u8]>,
    stack: Vec<Frame>,
    triples: Vec<Triple>,
    /// `xml:base` in scope for the current element.
    base: String,
    /// Bases of the enclosing open elements, restored as each one closes.
    outer_bases: Vec<String>,
    next_blank: usize,
}

fn xml_error(e: impl std::fmt::Display) -> NoticeError {
    NoticeError::malformed(KIND, e)
}

fn expand(ns: ResolveResult, local: LocalName) -> String {
    let local = String::from_utf8_lossy(local.as_ref());
    match ns {
        ResolveResult::Bound(Namespace(uri)) => {
            format!("{}{}", String::from_utf8_lossy(uri), local)
        }
        _ => local.into_owned(),
    }
}

/// Resolve an `rdf:about` / `rdf:resource` reference against the document base.
fn resolve_iri(base: &str, reference: &str) -> String {
    if base.is_empty() || reference.contains("://") || reference.starts_with("urn:") {
        return reference.to_string();
    }
    if reference.is_empty() {
        return base.to_string();
    }
    if reference.starts_with('#') {
        let doc = base.split('#').next().unwrap_or(base);
        return format!("{}{}", doc, reference);
    }
    match base.rfind('/') {
        Some(i) => format!("{}{}", &base[..=i], reference),
        None => reference.to_string(),
    }
}

impl<'x> Parser<'x> {
    fn new(xml: &'x str) -> Self {
        Parser {
            reader: NsReader::from_str(xml),
            stack: Vec::new(),
            triples: Vec::new(),
            base: String::new(),
            outer_bases: Vec::new(),
            next_blank: 0,
        }
    }

    fn run(mut self) -> Result<Vec<Triple>> {
        loop {
            match self.reader.read_event().map_err(xml_error)? {
                Event::Start(e) => self.open(&e, false)?,
                Event::Empty(e) => self.open(&e, true)?,
                Event::End(_) => self.close(),
                Event::Text(e) => {
                    let text = e.unescape().map_err(xml_error)?;
                    self.push_text(&text);
                }
                Event::CData(e) => {
                    let text = String::from_utf8_lossy(&e.into_inner()).into_owned();
                    self.push_text(&text);
                }
                Event::Eof => break,
                _ => {}
            }
        }
        Ok(self.triples)
    }

    fn emit(&mut self, subject: Term, predicate: impl Into<String>, object: Term) {
        self.triples.push(Triple {
            subject,
            predicate: predicate.into(),
            object,
        });
    }

    fn blank(&mut self) -> Term {
        self.next_blank += 1;
        Term::Blank(format!("genid-{}", self.next_blank))
    }

    fn element_iri(&self, e: &BytesStart) -> String {
        let (ns, local) = self.reader.resolve_element(e.name());
        expand(ns, local)
    }

    fn attrs(&mut self, e: &BytesStart) -> Result<Attrs> {
        let mut attrs = Attrs::default();
        for a in e.attributes() {
            let a = a.map_err(xml_error)?;
            let raw = a.key.as_ref();
            let value = a.unescape_value().map_err(xml_error)?.into_owned();
            if raw == b"xml:base" {
                self.base = value;
                continue;
            }
            if raw == b"xmlns" || raw.starts_with(b"xmlns:") || raw.starts_with(b"xml:") {
                continue;
            }

            let (ns, local) = self.reader.resolve_attribute(a.key);
            let iri = expand(ns, local);
            match iri.strip_prefix(RDF_NS) {
                Some("about") => attrs.about = Some(value),
                Some("ID") => attrs.id = Some(value),
                Some("nodeID") => attrs.node_id = Some(value),
                Some("resource") => attrs.resource = Some(value),
                Some("parseType") => attrs.parse_type = Some(value),
                Some("type") => attrs.rdf_type = Some(value),
                Some(_) => {}
                None => attrs.properties.push((iri, value)),
            }
        }
        Ok(attrs)
    }

    fn open(&mut self, e: &BytesStart, is_empty: bool) -> Result<()> {
        let outer = self.base.clone();
        self.open_element(e, is_empty)?;
        if is_empty {
            self.base = outer;
        } else {
            self.outer_bases.push(outer);
        }
        Ok(())
    }

    fn open_element(&mut self, e: &BytesStart, is_empty: bool) -> Result<()> {
        let iri = self.element_iri(e);

        match self.stack.last_mut() {
            None if iri == format!("{}RDF", RDF_NS) => {
                // only xml:base matters on the root element
                self.attrs(e)?;
                if !is_empty {
                    self.stack.push(Frame::Root);
                }
            }
            None | Some(Frame::Root) => self.node_element(e, iri, None, is_empty)?,
            Some(Frame::Node { subject }) => {
                let subject = subject.clone();
                self.property_element(e, subject, iri, is_empty)?;
            }
            Some(Frame::Property {
                literal_xml: true, ..
            })
            | Some(Frame::Skip) => {
                if !is_empty {
                    self.stack.push(Frame::Skip);
                }
            }
            Some(Frame::Property {
                subject,
                predicate,
                filled,
                ..
            }) => {
                *filled = true;
                let parent = (subject.clone(), predicate.clone());
                self.node_element(e, iri, Some(parent), is_empty)?;
            }
        }
        Ok(())
    }

    fn node_element(
        &mut self,
        e: &BytesStart,
        iri: String,
        parent: Option<(Term, String)>,
        is_empty: bool,
    ) -> Result<()> {
        let attrs = self.attrs(e)?;
        let subject = if let Some(about) = &attrs.about {
            Term::Iri(resolve_iri(&self.base, about))
        } else if let Some(id) = &attrs.id {
            Term::Iri(resolve_iri(&self.base, &format!("#{}", id)))
        } else if let Some(node_id) = &attrs.node_id {
            Term::Blank(node_id.clone())
        } else {
            self.blank()
        };

        if let Some((parent_subject, predicate)) = parent {
            self.emit(parent_subject, predicate, subject.clone());
        }
        if iri != format!("{}Description", RDF_NS) {
            self.emit(subject.clone(), RDF_TYPE, Term::Iri(iri));
        }
        if let Some(rdf_type) = &attrs.rdf_type {
            let type_iri = resolve_iri(&self.base, rdf_type);
            self.emit(subject.clone(), RDF_TYPE, Term::Iri(type_iri));
        }
        for (predicate, value) in attrs.properties {
            self.emit(subject.clone(), predicate, Term::Literal(value));
        }

        if !is_empty {
            self.stack.push(Frame::Node { subject });
        }
        Ok(())
    }

    fn property_element(
        &mut self,
        e: &BytesStart,
        subject: Term,
        predicate: String,
        is_empty: bool,
    ) -> Result<()> {
        let attrs = self.attrs(e)?;

        let object = if let Some(resource) = &attrs.resource {
            Some(Term::Iri(resolve_iri(&self.base, resource)))
        } else {
            attrs.node_id.clone().map(Term::Blank)
        };
        if let Some(object) = object {
            self.emit(subject.clone(), predicate.clone(), object);
            if !is_empty {
                self.stack.push(Frame::Property {
                    subject,
                    predicate,
                    text: String::new(),
                    filled: true,
                    literal_xml: false,
                });
            }
            return Ok(());
        }

        match attrs.parse_type.as_deref() {
            Some("Resource") => {
                let node = self.blank();
                self.emit(subject, predicate, node.clone());
                if !is_empty {
                    self.stack.push(Frame::Node { subject: node });
                }
                return Ok(());
            }
            Some("Literal") => {
                if is_empty {
                    self.emit(subject, predicate, Term::Literal(String::new()));
                } else {
                    self.stack.push(Frame::Property {
                        subject,
                        predicate,
                        text: String::new(),
                        filled: false,
                        literal_xml: true,
                    });
                }
                return Ok(());
            }
            Some(other) => {
                warn!(parse_type = other, predicate = %predicate, "unsupported rdf:parseType, skipping");
                if !is_empty {
                    self.stack.push(Frame::Skip);
                }
                return Ok(());
            }
            None => {}
        }

        if !attrs.properties.is_empty() {
            let node = self.blank();
            self.emit(subject, predicate, node.clone());
            for (p, value) in attrs.properties {
                self.emit(node.clone(), p, Term::Literal(value));
            }
            if !is_empty {
                self.stack.push(Frame::Node { subject: node });
            }
            return Ok(());
        }

        if is_empty {
            self.emit(subject, predicate, Term::Literal(String::new()));
        } else {
            self.stack.push(Frame::Property {
                subject,
                predicate,
                text: String::new(),
                filled: false,
                literal_xml: false,
            });
        }
        Ok(())
    }

    fn close(&mut self) {
        if let Some(outer) = self.outer_bases.pop() {
            self.base = outer;
        }
        if let Some(Frame::Property {
            subject,
            predicate,
            text,
            filled: false,
            ..
        }) = self.stack.pop()
        {
            self.emit(subject, predicate, Term::Literal(text));
        }
    }

    fn push_text(&mut self, text: &str) {
        // text under a Skip frame only counts inside a parseType="Literal" property
        for frame in self.stack.iter_mut().rev() {
            match frame {
                Frame::Property {
                    text: buf,
                    filled: false,
                    ..
                } => {
                    buf.push_str(text);
                    return;
                }
                Frame::Skip => continue,
                _ => return,
            }
        }
    }
}
