//! OAI-PMH responder over a static repository.
//!
//! [`respond`] answers one request from a parsed [`StaticRepository`] and the set of
//! included collection numbers. It has no I/O of its own: the HTTP front-end loads the
//! document through a [`SnapshotStore`], reads the inclusion table from the database,
//! logs the request with [`request_log`] and hands the resulting XML back verbatim.
//!
//! Protocol errors are answered in-band. The caller always replies `200 OK`.
//!
//! # Examples
//!
//! ```
//! use std::collections::BTreeSet;
//!
//! use chrono::NaiveDate;
//! use ead2dc::{
//!   oai::{respond, OaiRequest, ResponderSettings},
//!   repository::StaticRepository,
//! };
//!
//! let request = OaiRequest { verb: Some("ListSets".to_string()), ..Default::default() };
//! let settings = ResponderSettings { base_url: "https://example.org/oai".into(), max_records: 250 };
//! let today = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
//!
//! let xml = respond(&StaticRepository::default(), &BTreeSet::new(), &request, &settings, today).unwrap();
//! assert!(xml.contains("<responseDate>2024-01-01</responseDate>"));
//! assert!(xml.contains("<ListSets"));
//! ```

use chrono::NaiveDateTime;
use quick_xml::{
  events::{BytesStart, Event},
  Writer,
};

use super::*;
use crate::{
  config::Config,
  database::RequestLog,
  repository::{
    write_declaration, write_end, write_header, write_identify, write_metadata_format, write_record,
    write_root_start, write_set, write_start, write_text_element, Record, StaticRepository, XmlWriter,
    OAI_DC_PREFIX,
  },
};

pub mod store;
pub mod token;

pub use store::SnapshotStore;
pub use token::ResumptionToken;

/// Lower datestamp bound when `from` is absent.
pub const DEFAULT_FROM: &str = "000-00-00";
/// Upper datestamp bound when `until` is absent.
pub const DEFAULT_UNTIL: &str = "999-99-99";
/// Text of the `badVerb` error.
pub const BAD_VERB: &str = "Missing or invalid verb or key.";
/// Text of the `badArgument` error for a repeated argument.
pub const REPEATED_ARGUMENT: &str = "Repeated argument";
/// Text of the answer to `GetRecord` without an identifier.
pub const NO_IDENTIFIER: &str = "No identifier specified.";

/// The supported verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
  /// Repository description
  Identify,
  /// Available metadata formats
  ListMetadataFormats,
  /// Included collections
  ListSets,
  /// Records with metadata
  ListRecords,
  /// Record headers only
  ListIdentifiers,
  /// One record
  GetRecord,
}

impl Verb {
  /// Parses a `verb` argument; names are case-sensitive.
  pub fn from_name(name: &str) -> Option<Self> {
    match name {
      "Identify" => Some(Self::Identify),
      "ListMetadataFormats" => Some(Self::ListMetadataFormats),
      "ListSets" => Some(Self::ListSets),
      "ListRecords" => Some(Self::ListRecords),
      "ListIdentifiers" => Some(Self::ListIdentifiers),
      "GetRecord" => Some(Self::GetRecord),
      _ => None,
    }
  }

  /// The protocol name.
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Identify => "Identify",
      Self::ListMetadataFormats => "ListMetadataFormats",
      Self::ListSets => "ListSets",
      Self::ListRecords => "ListRecords",
      Self::ListIdentifiers => "ListIdentifiers",
      Self::GetRecord => "GetRecord",
    }
  }
}

/// Query arguments of one request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OaiRequest {
  /// `verb`
  pub verb:             Option<String>,
  /// `identifier`
  pub identifier:       Option<String>,
  /// `metadataPrefix`
  #[serde(rename = "metadataPrefix")]
  pub metadata_prefix:  Option<String>,
  /// `set`
  pub set:              Option<String>,
  /// `from`
  pub from:             Option<String>,
  /// `until`
  pub until:            Option<String>,
  /// `resumptionToken`
  #[serde(rename = "resumptionToken")]
  pub resumption_token: Option<String>,
  /// Names of arguments given more than once
  #[serde(skip)]
  pub repeated:         Vec<String>,
}

impl OaiRequest {
  /// Reads the arguments of a raw query string such as `verb=ListSets`.
  ///
  /// The first occurrence of an argument wins; later ones are noted in
  /// [`OaiRequest::repeated`]. Unknown arguments are ignored.
  pub fn from_query(query: &str) -> Self {
    let mut request = Self::default();
    for (name, value) in url::form_urlencoded::parse(query.as_bytes()) {
      let slot = match name.as_ref() {
        "verb" => &mut request.verb,
        "identifier" => &mut request.identifier,
        "metadataPrefix" => &mut request.metadata_prefix,
        "set" => &mut request.set,
        "from" => &mut request.from,
        "until" => &mut request.until,
        "resumptionToken" => &mut request.resumption_token,
        _ => continue,
      };
      if slot.is_some() {
        if !request.repeated.iter().any(|repeated| *repeated == name) {
          request.repeated.push(name.into_owned());
        }
      } else {
        *slot = Some(value.into_owned());
      }
    }
    request
  }

  /// Arguments echoed in the response's `request` element.
  fn echoed(&self) -> Vec<(&'static str, &str)> {
    [
      ("verb", &self.verb),
      ("identifier", &self.identifier),
      ("metadataPrefix", &self.metadata_prefix),
      ("set", &self.set),
      ("from", &self.from),
      ("until", &self.until),
      ("resumptionToken", &self.resumption_token),
    ]
    .into_iter()
    .filter_map(|(name, value)| value.as_deref().map(|value| (name, value)))
    .collect()
  }
}

/// Responder settings taken from the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponderSettings {
  /// Data provider URL, the text of the `request` element
  pub base_url:    String,
  /// Page size of list verbs
  pub max_records: usize,
}

impl From<&Config> for ResponderSettings {
  fn from(config: &Config) -> Self {
    Self {
      base_url:    config.repository.base_url.clone(),
      max_records: config.server.max_records,
    }
  }
}

/// Selective-harvesting arguments of a list request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct ListQuery {
  /// Requested set
  set:     Option<String>,
  /// Lower datestamp bound
  from:    Option<String>,
  /// Upper datestamp bound
  until:   Option<String>,
  /// Matching records already delivered
  start:   usize,
  /// Whether the request carried a resumption token
  resumed: bool,
}

impl ListQuery {
  /// Reads the query from a token when present, from the arguments otherwise.
  fn from_request(request: &OaiRequest) -> Result<Self, Ead2dcError> {
    match &request.resumption_token {
      Some(token) => {
        let token = ResumptionToken::decode(token)?;
        Ok(Self { set: token.set, from: token.from, until: token.until, start: token.cursor, resumed: true })
      },
      None => Ok(Self {
        set:     request.set.clone(),
        from:    request.from.clone(),
        until:   request.until.clone(),
        start:   0,
        resumed: false,
      }),
    }
  }

  /// Whether a record is selected by this query.
  fn matches(&self, record: &Record, included: &BTreeSet<String>) -> bool {
    let datestamp = record.header.datestamp.as_str();
    let from = day(self.from.as_deref().unwrap_or(DEFAULT_FROM));
    let until = day(self.until.as_deref().unwrap_or(DEFAULT_UNTIL));
    if datestamp < from || datestamp > until {
      return false;
    }
    record.header.set_specs.iter().any(|set_spec| {
      self.set.as_deref().map_or(true, |set| set == set_spec) && is_included(set_spec, included)
    })
  }

  /// The token resuming after `cursor` matching records.
  fn token(&self, cursor: usize) -> ResumptionToken {
    ResumptionToken { set: self.set.clone(), from: self.from.clone(), until: self.until.clone(), cursor }
  }
}

/// Date part of a `from`/`until` argument.
fn day(value: &str) -> &str { value.split('T').next().unwrap_or(value) }

/// Whether the collection a setSpec names is served.
fn is_included(set_spec: &str, included: &BTreeSet<String>) -> bool {
  refs::parse_set_spec(set_spec).is_some_and(|(_, number)| included.contains(number))
}

/// Whether any of the record's sets is served.
fn is_visible(record: &Record, included: &BTreeSet<String>) -> bool {
  record.header.set_specs.iter().any(|set_spec| is_included(set_spec, included))
}

/// One page of a list response.
#[derive(Debug)]
struct ListPage<'r> {
  /// Records on this page
  records:          Vec<&'r Record>,
  /// `(cursor, text)` of the closing token; empty text ends a resumed listing
  resumption_token: Option<(usize, String)>,
}

/// Selects the matching records after `query.start`, at most `max_records` of them.
fn list_page<'r>(
  repository: &'r StaticRepository,
  included: &BTreeSet<String>,
  query: &ListQuery,
  max_records: usize,
) -> ListPage<'r> {
  let mut matching = repository.records.iter().filter(|record| query.matches(record, included)).skip(query.start);
  let records = matching.by_ref().take(max_records).collect::<Vec<_>>();
  let more = matching.next().is_some();

  let resumption_token = if more {
    let cursor = query.start + records.len();
    Some((cursor, query.token(cursor).encode()))
  } else if query.resumed {
    Some((query.start + records.len(), String::new()))
  } else {
    None
  };
  trace!("Listing {} records after {} (more: {more})", records.len(), query.start);
  ListPage { records, resumption_token }
}

/// Answers one OAI-PMH request.
///
/// # Errors
///
/// Only XML writing can fail; every protocol problem is part of the returned document.
pub fn respond(
  repository: &StaticRepository,
  included: &BTreeSet<String>,
  request: &OaiRequest,
  settings: &ResponderSettings,
  today: NaiveDate,
) -> Result<String, Ead2dcError> {
  let Some(verb) = request.verb.as_deref().and_then(Verb::from_name) else {
    debug!("Rejecting request with verb {:?}", request.verb);
    return envelope(settings, today, &[], |writer| write_error(writer, "badVerb", BAD_VERB));
  };

  if !request.repeated.is_empty() {
    let message = format!("{REPEATED_ARGUMENT}: {}.", request.repeated.join(", "));
    debug!("Rejecting {}: {message}", verb.as_str());
    return envelope(settings, today, &[], |writer| write_error(writer, "badArgument", &message));
  }

  if verb == Verb::GetRecord && request.identifier.is_none() {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    write_declaration(&mut writer)?;
    write_text_element(&mut writer, "noThing", &[], NO_IDENTIFIER)?;
    return into_string(writer);
  }

  let echoed = request.echoed();
  if matches!(verb, Verb::ListRecords | Verb::ListIdentifiers | Verb::GetRecord)
    && request.resumption_token.is_none()
  {
    if let Some(prefix) = request.metadata_prefix.as_deref().filter(|p| *p != OAI_DC_PREFIX) {
      let message = format!("The metadata format '{prefix}' is not supported.");
      return envelope(settings, today, &echoed, |writer| {
        write_error(writer, "cannotDisseminateFormat", &message)
      });
    }
  }

  match verb {
    Verb::Identify => envelope(settings, today, &echoed, |writer| write_identify(writer, &repository.identify)),
    Verb::ListMetadataFormats => {
      let known = match request.identifier.as_deref() {
        None => true,
        Some(identifier) =>
          repository.find_record(identifier).is_some_and(|record| is_visible(record, included)),
      };
      envelope(settings, today, &echoed, |writer| {
        write_start(writer, "ListMetadataFormats", &[])?;
        if known {
          for format in &repository.metadata_formats {
            write_metadata_format(writer, format)?;
          }
        }
        write_end(writer, "ListMetadataFormats")
      })
    },
    Verb::ListSets => envelope(settings, today, &echoed, |writer| {
      write_start(writer, "ListSets", &[])?;
      for set in repository.sets.iter().filter(|set| is_included(&set.set_spec, included)) {
        write_set(writer, set)?;
      }
      write_end(writer, "ListSets")
    }),
    Verb::ListRecords | Verb::ListIdentifiers => {
      let query = match ListQuery::from_request(request) {
        Ok(query) => query,
        Err(e) => {
          debug!("Rejecting resumption token {:?}: {e}", request.resumption_token);
          return envelope(settings, today, &echoed, |writer| {
            write_error(writer, "badResumptionToken", "The resumption token is invalid or expired.")
          });
        },
      };
      let page = list_page(repository, included, &query, settings.max_records);
      envelope(settings, today, &echoed, |writer| write_list(writer, verb, &page))
    },
    Verb::GetRecord => {
      let record = request
        .identifier
        .as_deref()
        .and_then(|identifier| repository.find_record(identifier))
        .filter(|record| is_visible(record, included));
      envelope(settings, today, &echoed, |writer| {
        write_start(writer, "GetRecord", &[])?;
        if let Some(record) = record {
          write_record(writer, record, true)?;
        }
        write_end(writer, "GetRecord")
      })
    },
  }
}

/// Writes the body of `ListRecords` or `ListIdentifiers`.
fn write_list<W: std::io::Write>(writer: &mut XmlWriter<W>, verb: Verb, page: &ListPage) -> Result<(), Ead2dcError> {
  let with_metadata = verb == Verb::ListRecords;
  if with_metadata {
    write_start(writer, verb.as_str(), &[("metadataPrefix", OAI_DC_PREFIX)])?;
  } else {
    write_start(writer, verb.as_str(), &[])?;
  }

  for record in &page.records {
    if with_metadata {
      write_record(writer, record, true)?;
    } else {
      write_header(writer, &record.header)?;
    }
  }

  if let Some((cursor, text)) = &page.resumption_token {
    let cursor = cursor.to_string();
    if text.is_empty() {
      let element = BytesStart::new("resumptionToken").with_attributes([("cursor", cursor.as_str())]);
      writer.write_event(Event::Empty(element))?;
    } else {
      write_text_element(writer, "resumptionToken", &[("cursor", cursor.as_str())], text)?;
    }
  }

  write_end(writer, verb.as_str())
}

/// Writes an OAI `error` element.
fn write_error<W: std::io::Write>(writer: &mut XmlWriter<W>, code: &str, message: &str) -> Result<(), Ead2dcError> {
  write_text_element(writer, "error", &[("code", code)], message)
}

/// Wraps `body` in the `OAI-PMH` envelope with `responseDate` and `request`.
fn envelope<F>(
  settings: &ResponderSettings,
  today: NaiveDate,
  arguments: &[(&str, &str)],
  body: F,
) -> Result<String, Ead2dcError>
where
  F: FnOnce(&mut XmlWriter<Vec<u8>>) -> Result<(), Ead2dcError>,
{
  let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
  write_declaration(&mut writer)?;
  write_root_start(&mut writer)?;
  write_text_element(&mut writer, "responseDate", &[], &today.format("%Y-%m-%d").to_string())?;
  write_text_element(&mut writer, "request", arguments, &settings.base_url)?;
  body(&mut writer)?;
  write_end(&mut writer, "OAI-PMH")?;
  into_string(writer)
}

/// The written document as a string.
fn into_string(writer: XmlWriter<Vec<u8>>) -> Result<String, Ead2dcError> {
  String::from_utf8(writer.into_inner())
    .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e).into())
}

/// The `logs` row for a request received at `now`.
///
/// Arguments come from the resumption token when it can be read. Missing values are
/// logged as the defaults the responder applies: `000` for the set and the open
/// datestamp bounds.
pub fn request_log(request: &OaiRequest, now: NaiveDateTime) -> RequestLog {
  let query = ListQuery::from_request(request).unwrap_or_else(|_| ListQuery {
    set: request.set.clone(),
    from: request.from.clone(),
    until: request.until.clone(),
    ..Default::default()
  });
  RequestLog {
    date:       now.format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
    verb:       request.verb.clone(),
    set:        Some(query.set.unwrap_or_else(|| token::ANY_SET.to_string())),
    identifier: request.identifier.as_deref().map(|id| format::identifier_tail(id).to_string()),
    from:       Some(query.from.unwrap_or_else(|| DEFAULT_FROM.to_string())),
    until:      Some(query.until.unwrap_or_else(|| DEFAULT_UNTIL.to_string())),
  }
}
