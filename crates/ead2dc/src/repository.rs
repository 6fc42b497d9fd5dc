//! The static OAI-PMH repository document.
//!
//! A build produces one XML file holding everything the responder serves:
//!
//! ```xml
//! <OAI-PMH xmlns="http://www.openarchives.org/OAI/2.0/" ...>
//!   <Identify>...</Identify>
//!   <ListMetadataFormats>...</ListMetadataFormats>
//!   <ListSets>...</ListSets>
//!   <ListRecords metadataPrefix="oai_dc">
//!     <record>
//!       <header>...</header>
//!       <metadata><oai_dc:dc ...>...</oai_dc:dc></metadata>
//!     </record>
//!   </ListRecords>
//! </OAI-PMH>
//! ```
//!
//! The document is modelled by [`StaticRepository`]. It is written with
//! [`quick_xml::Writer`] and read back with `quick_xml::de`. The fragment writers
//! ([`write_identify`], [`write_set`], [`write_record`], ...) are public so the
//! responder can re-emit parsed fragments into its own envelopes exactly as they were
//! built.

use std::io::Write;

use quick_xml::{
  events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event},
  Writer,
};

use super::*;
use crate::config::RepositorySettings;

/// The OAI-PMH namespace.
pub const OAI_NAMESPACE: &str = "http://www.openarchives.org/OAI/2.0/";
/// Schema location of OAI-PMH responses.
pub const OAI_SCHEMA_LOCATION: &str =
  "http://www.openarchives.org/OAI/2.0/ http://www.openarchives.org/OAI/2.0/OAI-PMH.xsd";
/// The `oai_dc` container namespace.
pub const OAI_DC_NAMESPACE: &str = "http://www.openarchives.org/OAI/2.0/oai_dc/";
/// The `oai_dc` schema.
pub const OAI_DC_SCHEMA: &str = "http://www.openarchives.org/OAI/2.0/oai_dc.xsd";
/// Dublin Core elements namespace.
pub const DC_NAMESPACE: &str = "http://purl.org/dc/elements/1.1/";
/// DCMI terms namespace.
pub const DCTERMS_NAMESPACE: &str = "http://purl.org/dc/terms/";
/// XML Schema instance namespace.
pub const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// The single metadata prefix this repository supports.
pub const OAI_DC_PREFIX: &str = "oai_dc";

/// Writer type used for every document and fragment.
pub type XmlWriter<W> = Writer<W>;

/// The `Identify` block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Identify {
  /// Human readable repository name
  #[serde(rename = "repositoryName", default)]
  pub repository_name:    String,
  /// Responder URL
  #[serde(rename = "baseURL", default)]
  pub base_url:           String,
  /// Always `2.0`
  #[serde(rename = "protocolVersion", default)]
  pub protocol_version:   String,
  /// Contact address
  #[serde(rename = "adminEmail", default)]
  pub admin_email:        String,
  /// Oldest datestamp in the repository
  #[serde(rename = "earliestDatestamp", default)]
  pub earliest_datestamp: String,
  /// Always `no`
  #[serde(rename = "deletedRecord", default)]
  pub deleted_record:     String,
  /// Always `YYYY-MM-DD`
  #[serde(default)]
  pub granularity:        String,
}

impl Identify {
  /// Builds the block from the repository settings.
  pub fn new(settings: &RepositorySettings, earliest_datestamp: impl Into<String>) -> Self {
    Self {
      repository_name:    settings.name.clone(),
      base_url:           settings.base_url.clone(),
      protocol_version:   "2.0".to_string(),
      admin_email:        settings.admin_email.clone(),
      earliest_datestamp: earliest_datestamp.into(),
      deleted_record:     "no".to_string(),
      granularity:        "YYYY-MM-DD".to_string(),
    }
  }
}

/// One supported metadata format.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MetadataFormat {
  /// e.g. `oai_dc`
  #[serde(rename = "metadataPrefix", default)]
  pub metadata_prefix:    String,
  /// Schema URL
  #[serde(default)]
  pub schema:             String,
  /// Namespace URL
  #[serde(rename = "metadataNamespace", default)]
  pub metadata_namespace: String,
}

impl MetadataFormat {
  /// The unqualified Dublin Core format.
  pub fn oai_dc() -> Self {
    Self {
      metadata_prefix:    OAI_DC_PREFIX.to_string(),
      schema:             OAI_DC_SCHEMA.to_string(),
      metadata_namespace: OAI_DC_NAMESPACE.to_string(),
    }
  }
}

/// One set, i.e. one collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OaiSet {
  /// e.g. `resource_30`
  pub set_spec:    String,
  /// Collection title
  pub set_name:    String,
  /// Collection description, empty when the collection has no published notes
  pub description: String,
}

/// A record header.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Header {
  /// Prefixed archival object path
  #[serde(default)]
  pub identifier: String,
  /// `YYYY-MM-DD`
  #[serde(default)]
  pub datestamp:  String,
  /// One per owning collection
  #[serde(rename = "setSpec", default)]
  pub set_specs:  Vec<String>,
}

/// A `dc:title`; ancestor titles carry their hierarchy level.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DcTitle {
  /// Level of an ancestor, e.g. `series`
  #[serde(rename = "@level", default)]
  pub level: Option<String>,
  /// Title text
  #[serde(rename = "$text", default)]
  pub value: String,
}

/// A `dc:identifier`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DcIdentifier {
  /// `URI` for file locations
  #[serde(rename = "@scheme", default)]
  pub scheme:  Option<String>,
  /// Use statement, `unknown` or `localid`
  #[serde(rename = "@type", default)]
  pub id_type: Option<String>,
  /// Identifier text
  #[serde(rename = "$text", default)]
  pub value:   String,
}

/// A `dc:subject`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DcSubject {
  /// Vocabulary, e.g. `lcsh`
  #[serde(rename = "@source", default)]
  pub source: Option<String>,
  /// Heading
  #[serde(rename = "$text", default)]
  pub value:  String,
}

/// The Dublin Core payload of a record, in element order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DublinCore {
  /// Own title first, then ancestor titles
  #[serde(rename = "title", default)]
  pub titles:      Vec<DcTitle>,
  /// File URIs, then the local id
  #[serde(rename = "identifier", default)]
  pub identifiers: Vec<DcIdentifier>,
  /// Begin dates
  #[serde(rename = "date", default)]
  pub dates:       Vec<String>,
  /// Extent statements
  #[serde(rename = "format", default)]
  pub formats:     Vec<String>,
  /// DCMI types
  #[serde(rename = "type", default)]
  pub types:       Vec<String>,
  /// Subject headings
  #[serde(rename = "subject", default)]
  pub subjects:    Vec<DcSubject>,
  /// Rights statement
  #[serde(default)]
  pub rights:      Option<String>,
}

/// One record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
  /// Header
  pub header:   Header,
  /// Dublin Core payload
  pub metadata: DublinCore,
}

impl Record {
  /// Collection numbers of the sets this record belongs to.
  pub fn collection_numbers(&self) -> impl Iterator<Item = &str> {
    self.header.set_specs.iter().filter_map(|spec| refs::parse_set_spec(spec).map(|(_, n)| n))
  }
}

/// The whole static repository.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticRepository {
  /// `Identify` block
  pub identify:         Identify,
  /// Supported metadata formats
  pub metadata_formats: Vec<MetadataFormat>,
  /// One set per collection with digital content
  pub sets:             Vec<OaiSet>,
  /// All records, in build order
  pub records:          Vec<Record>,
}

impl StaticRepository {
  /// Serializes the document.
  pub fn to_xml(&self) -> Result<String, Ead2dcError> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    write_document(&mut writer, self)?;
    String::from_utf8(writer.into_inner())
      .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e).into())
  }

  /// Parses a document produced by [`StaticRepository::to_xml`].
  pub fn from_xml(xml: &str) -> Result<Self, Ead2dcError> {
    let document: xml::Document = quick_xml::de::from_str(xml)?;
    Ok(document.into())
  }

  /// Reads and parses the document at `path`.
  pub async fn load(path: &Path) -> Result<Self, Ead2dcError> {
    let xml = tokio::fs::read_to_string(path).await?;
    Self::from_xml(&xml)
  }

  /// Finds a record by its header identifier.
  pub fn find_record(&self, identifier: &str) -> Option<&Record> {
    self.records.iter().find(|record| record.header.identifier == identifier)
  }

  /// The smallest record datestamp, if there are records.
  pub fn earliest_datestamp(&self) -> Option<&str> {
    self.records.iter().map(|record| record.header.datestamp.as_str()).min()
  }
}

/// Serde shapes of the on-disk document.
///
/// The public model flattens the wrapper elements away; these types mirror the XML
/// one to one.
mod xml {
  use super::*;

  /// Root element.
  #[derive(Debug, Deserialize)]
  #[serde(rename = "OAI-PMH")]
  pub(super) struct Document {
    /// `Identify`
    #[serde(rename = "Identify", default)]
    identify:         Identify,
    /// `ListMetadataFormats`
    #[serde(rename = "ListMetadataFormats", default)]
    metadata_formats: MetadataFormats,
    /// `ListSets`
    #[serde(rename = "ListSets", default)]
    sets:             Sets,
    /// `ListRecords`
    #[serde(rename = "ListRecords", default)]
    records:          Records,
  }

  /// `ListMetadataFormats` contents.
  #[derive(Debug, Default, Deserialize)]
  struct MetadataFormats {
    /// `metadataFormat` elements
    #[serde(rename = "metadataFormat", default)]
    formats: Vec<MetadataFormat>,
  }

  /// `ListSets` contents.
  #[derive(Debug, Default, Deserialize)]
  struct Sets {
    /// `set` elements
    #[serde(rename = "set", default)]
    sets: Vec<Set>,
  }

  /// One `set`.
  #[derive(Debug, Deserialize)]
  struct Set {
    /// `setSpec`
    #[serde(rename = "setSpec", default)]
    set_spec:    String,
    /// `setName`
    #[serde(rename = "setName", default)]
    set_name:    String,
    /// `setDescription`
    #[serde(rename = "setDescription", default)]
    description: Option<SetDescription>,
  }

  /// `setDescription` wrapping an `oai_dc:dc` container.
  #[derive(Debug, Deserialize)]
  struct SetDescription {
    /// `oai_dc:dc`
    #[serde(rename = "dc", default)]
    dc: Option<DescriptionDc>,
  }

  /// The container of a set's `dc:description`.
  #[derive(Debug, Deserialize)]
  struct DescriptionDc {
    /// `dc:description`
    #[serde(default)]
    description: Option<String>,
  }

  /// `ListRecords` contents.
  #[derive(Debug, Default, Deserialize)]
  struct Records {
    /// `record` elements
    #[serde(rename = "record", default)]
    records: Vec<RecordXml>,
  }

  /// One `record`.
  #[derive(Debug, Deserialize)]
  struct RecordXml {
    /// `header`
    #[serde(default)]
    header:   Header,
    /// `metadata`
    #[serde(default)]
    metadata: Option<Metadata>,
  }

  /// `metadata` wrapping the `oai_dc:dc` payload.
  #[derive(Debug, Deserialize)]
  struct Metadata {
    /// `oai_dc:dc`
    #[serde(rename = "dc", default)]
    dublin_core: DublinCore,
  }

  impl From<Document> for StaticRepository {
    fn from(document: Document) -> Self {
      Self {
        identify:         document.identify,
        metadata_formats: document.metadata_formats.formats,
        sets:             document
          .sets
          .sets
          .into_iter()
          .map(|set| OaiSet {
            set_spec:    set.set_spec,
            set_name:    set.set_name,
            description: set
              .description
              .and_then(|d| d.dc)
              .and_then(|dc| dc.description)
              .unwrap_or_default(),
          })
          .collect(),
        records:          document
          .records
          .records
          .into_iter()
          .map(|record| Record {
            header:   record.header,
            metadata: record.metadata.map(|m| m.dublin_core).unwrap_or_default(),
          })
          .collect(),
      }
    }
  }
}

/// Writes `<name attrs...>text</name>`.
pub fn write_text_element<W: Write>(
  writer: &mut XmlWriter<W>,
  name: &str,
  attributes: &[(&str, &str)],
  text: &str,
) -> Result<(), Ead2dcError> {
  writer.write_event(Event::Start(BytesStart::new(name).with_attributes(attributes.iter().copied())))?;
  writer.write_event(Event::Text(BytesText::new(text)))?;
  writer.write_event(Event::End(BytesEnd::new(name)))?;
  Ok(())
}

/// Writes an opening tag.
pub fn write_start<W: Write>(
  writer: &mut XmlWriter<W>,
  name: &str,
  attributes: &[(&str, &str)],
) -> Result<(), Ead2dcError> {
  writer.write_event(Event::Start(BytesStart::new(name).with_attributes(attributes.iter().copied())))?;
  Ok(())
}

/// Writes a closing tag.
pub fn write_end<W: Write>(writer: &mut XmlWriter<W>, name: &str) -> Result<(), Ead2dcError> {
  writer.write_event(Event::End(BytesEnd::new(name)))?;
  Ok(())
}

/// Writes the XML declaration.
pub fn write_declaration<W: Write>(writer: &mut XmlWriter<W>) -> Result<(), Ead2dcError> {
  writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
  Ok(())
}

/// Opens the `OAI-PMH` root element with its namespace declarations.
pub fn write_root_start<W: Write>(writer: &mut XmlWriter<W>) -> Result<(), Ead2dcError> {
  write_start(writer, "OAI-PMH", &[
    ("xmlns", OAI_NAMESPACE),
    ("xmlns:xsi", XSI_NAMESPACE),
    ("xsi:schemaLocation", OAI_SCHEMA_LOCATION),
  ])
}

/// Writes the `Identify` element.
pub fn write_identify<W: Write>(writer: &mut XmlWriter<W>, identify: &Identify) -> Result<(), Ead2dcError> {
  write_start(writer, "Identify", &[])?;
  write_text_element(writer, "repositoryName", &[], &identify.repository_name)?;
  write_text_element(writer, "baseURL", &[], &identify.base_url)?;
  write_text_element(writer, "protocolVersion", &[], &identify.protocol_version)?;
  write_text_element(writer, "adminEmail", &[], &identify.admin_email)?;
  write_text_element(writer, "earliestDatestamp", &[], &identify.earliest_datestamp)?;
  write_text_element(writer, "deletedRecord", &[], &identify.deleted_record)?;
  write_text_element(writer, "granularity", &[], &identify.granularity)?;
  write_end(writer, "Identify")
}

/// Writes one `metadataFormat` element.
pub fn write_metadata_format<W: Write>(
  writer: &mut XmlWriter<W>,
  format: &MetadataFormat,
) -> Result<(), Ead2dcError> {
  write_start(writer, "metadataFormat", &[])?;
  write_text_element(writer, "metadataPrefix", &[], &format.metadata_prefix)?;
  write_text_element(writer, "schema", &[], &format.schema)?;
  write_text_element(writer, "metadataNamespace", &[], &format.metadata_namespace)?;
  write_end(writer, "metadataFormat")
}

/// Writes one `set` element, with its description wrapped in `oai_dc`.
pub fn write_set<W: Write>(writer: &mut XmlWriter<W>, set: &OaiSet) -> Result<(), Ead2dcError> {
  write_start(writer, "set", &[])?;
  write_text_element(writer, "setSpec", &[], &set.set_spec)?;
  write_text_element(writer, "setName", &[], &set.set_name)?;
  let schema_location = format!("{OAI_DC_NAMESPACE} {OAI_DC_SCHEMA}");
  write_start(writer, "setDescription", &[])?;
  write_start(writer, "oai_dc:dc", &[
    ("xmlns:oai_dc", OAI_DC_NAMESPACE),
    ("xmlns:dc", DC_NAMESPACE),
    ("xmlns:xsi", XSI_NAMESPACE),
    ("xsi:schemaLocation", schema_location.as_str()),
  ])?;
  write_text_element(writer, "dc:description", &[], &set.description)?;
  write_end(writer, "oai_dc:dc")?;
  write_end(writer, "setDescription")?;
  write_end(writer, "set")
}

/// Writes a record `header` element.
pub fn write_header<W: Write>(writer: &mut XmlWriter<W>, header: &Header) -> Result<(), Ead2dcError> {
  write_start(writer, "header", &[])?;
  write_text_element(writer, "identifier", &[], &header.identifier)?;
  write_text_element(writer, "datestamp", &[], &header.datestamp)?;
  for set_spec in &header.set_specs {
    write_text_element(writer, "setSpec", &[], set_spec)?;
  }
  write_end(writer, "header")
}

/// Writes the `oai_dc:dc` payload.
pub fn write_dublin_core<W: Write>(writer: &mut XmlWriter<W>, dc: &DublinCore) -> Result<(), Ead2dcError> {
  write_start(writer, "oai_dc:dc", &[
    ("xmlns:oai_dc", OAI_DC_NAMESPACE),
    ("xmlns:dc", DC_NAMESPACE),
    ("xmlns:dcterms", DCTERMS_NAMESPACE),
  ])?;
  for title in &dc.titles {
    match &title.level {
      Some(level) => write_text_element(writer, "dc:title", &[("level", level.as_str())], &title.value)?,
      None => write_text_element(writer, "dc:title", &[], &title.value)?,
    }
  }
  for identifier in &dc.identifiers {
    let mut attributes = Vec::new();
    if let Some(scheme) = &identifier.scheme {
      attributes.push(("scheme", scheme.as_str()));
    }
    if let Some(id_type) = &identifier.id_type {
      attributes.push(("type", id_type.as_str()));
    }
    write_text_element(writer, "dc:identifier", &attributes, &identifier.value)?;
  }
  for date in &dc.dates {
    write_text_element(writer, "dc:date", &[], date)?;
  }
  for format in &dc.formats {
    write_text_element(writer, "dc:format", &[], format)?;
  }
  for dc_type in &dc.types {
    write_text_element(writer, "dc:type", &[], dc_type)?;
  }
  for subject in &dc.subjects {
    match &subject.source {
      Some(source) =>
        write_text_element(writer, "dc:subject", &[("source", source.as_str())], &subject.value)?,
      None => write_text_element(writer, "dc:subject", &[], &subject.value)?,
    }
  }
  if let Some(rights) = &dc.rights {
    write_text_element(writer, "dc:rights", &[], rights)?;
  }
  write_end(writer, "oai_dc:dc")
}

/// Writes a `record` element; the `metadata` child is left out when `with_metadata`
/// is false.
pub fn write_record<W: Write>(
  writer: &mut XmlWriter<W>,
  record: &Record,
  with_metadata: bool,
) -> Result<(), Ead2dcError> {
  write_start(writer, "record", &[])?;
  write_header(writer, &record.header)?;
  if with_metadata {
    write_start(writer, "metadata", &[])?;
    write_dublin_core(writer, &record.metadata)?;
    write_end(writer, "metadata")?;
  }
  write_end(writer, "record")
}

/// Writes the full static repository document.
pub fn write_document<W: Write>(
  writer: &mut XmlWriter<W>,
  repository: &StaticRepository,
) -> Result<(), Ead2dcError> {
  write_declaration(writer)?;
  write_root_start(writer)?;
  write_identify(writer, &repository.identify)?;

  write_start(writer, "ListMetadataFormats", &[])?;
  for format in &repository.metadata_formats {
    write_metadata_format(writer, format)?;
  }
  write_end(writer, "ListMetadataFormats")?;

  write_start(writer, "ListSets", &[])?;
  for set in &repository.sets {
    write_set(writer, set)?;
  }
  write_end(writer, "ListSets")?;

  write_start(writer, "ListRecords", &[("metadataPrefix", OAI_DC_PREFIX)])?;
  for record in &repository.records {
    write_record(writer, record, true)?;
  }
  write_end(writer, "ListRecords")?;

  write_end(writer, "OAI-PMH")
}
