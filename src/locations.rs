//! Server locations registry.
//!
//! Parses the line-oriented permissions file format into an ordered list of
//! location records. Each data line is `scheme://host[:port]` followed by
//! whitespace and a comma-separated option list; `#` comments and blank
//! lines are skipped. The registry enforces exactly one `primary` location
//! and no duplicate (scheme, host, port) origins, and notifies registered
//! callbacks with the records added by each successful mutation.

use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use thiserror::Error;
use tracing::{debug, info};

use crate::error::Result;

/// Port assumed when a location line omits one.
pub const DEFAULT_PORT: &str = "80";

/// Option marking the single location tests are served from.
pub const PRIMARY: &str = "primary";

/// A single location record or registry invariant violation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LocationError {
    #[error("bad value for option port: {0:?}")]
    BadPort(String),

    #[error("missing primary location")]
    MissingPrimary,

    #[error("multiple primary locations")]
    MultiplePrimary,

    #[error("duplicate location: {0}")]
    Duplicate(String),

    #[error("malformed location line: {0:?}")]
    Malformed(String),
}

/// A [`LocationError`] attributed to a 1-based line of a locations file.
///
/// Registry-wide checks that run after the whole file is parsed (the
/// primary-location count) are attributed to the line after the last.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("syntax error in locations file at line {line}: {cause}")]
pub struct LocationsSyntaxError {
    pub line: usize,
    pub cause: LocationError,
}

/// One network origin tests may run against: scheme, host, port, plus a set
/// of role options. Identity for duplicate detection is (scheme, host, port);
/// the port stays a string, as it appears in the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub scheme: String,
    pub host: String,
    pub port: String,
    pub options: Vec<String>,
}

impl Location {
    /// Build a location, validating the port and collapsing duplicate
    /// options while preserving first-seen order. `options` is the raw
    /// comma-separated list from the file.
    pub fn new(
        scheme: &str,
        host: &str,
        port: &str,
        options: &str,
    ) -> std::result::Result<Self, LocationError> {
        validate_port(port)?;
        let mut seen = Vec::new();
        for option in options.split(',') {
            let option = option.trim();
            if option.is_empty() || seen.iter().any(|o| o == option) {
                continue;
            }
            seen.push(option.to_string());
        }
        Ok(Location {
            scheme: scheme.to_string(),
            host: host.to_string(),
            port: port.to_string(),
            options: seen,
        })
    }

    /// Render the origin as `scheme://host:port`.
    pub fn url(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }

    /// Whether this record carries the `primary` role.
    pub fn is_primary(&self) -> bool {
        self.options.iter().any(|o| o == PRIMARY)
    }

    /// Identity comparison: same (scheme, host, port), options ignored.
    pub fn same_origin(&self, other: &Location) -> bool {
        self.scheme == other.scheme && self.host == other.host && self.port == other.port
    }
}

/// Ports must be positive integer strings.
fn validate_port(port: &str) -> std::result::Result<(), LocationError> {
    match port.parse::<u32>() {
        Ok(n) if n > 0 => Ok(()),
        _ => Err(LocationError::BadPort(port.to_string())),
    }
}

/// Parse one non-blank, non-comment line into a [`Location`].
fn parse_line(line: &str) -> std::result::Result<Location, LocationError> {
    let malformed = || LocationError::Malformed(line.to_string());

    let mut fields = line.split_whitespace();
    let url = fields.next().ok_or_else(malformed)?;
    let options = fields.next().ok_or_else(malformed)?;
    if fields.next().is_some() {
        // Options lists must not contain spaces.
        return Err(malformed());
    }

    let (scheme, rest) = url.split_once("://").ok_or_else(malformed)?;
    if scheme.is_empty() || rest.is_empty() {
        return Err(malformed());
    }
    let (host, port) = match rest.rsplit_once(':') {
        Some((host, port)) => (host, port),
        None => (rest, DEFAULT_PORT),
    };
    if host.is_empty() {
        return Err(malformed());
    }

    Location::new(scheme, host, port, options)
}

/// Observer invoked after each successful mutation with just the records
/// added by that call.
pub type LocationsCallback = Box<dyn FnMut(&[Location])>;

/// Ordered registry of [`Location`] records loaded from zero or more
/// locations files, with incremental `add` and mutation notification.
#[derive(Default)]
pub struct ServerLocations {
    locations: Vec<Location>,
    callbacks: Vec<LocationsCallback>,
}

impl ServerLocations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry populated from a locations file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut locations = Self::new();
        locations.read(path)?;
        Ok(locations)
    }

    /// Register a mutation observer. A registry may carry any number of
    /// callbacks; each is invoked synchronously, in registration order,
    /// with the records added by the mutating call.
    pub fn add_callback<F>(&mut self, callback: F)
    where
        F: FnMut(&[Location]) + 'static,
    {
        self.callbacks.push(Box::new(callback));
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Location> {
        self.locations.iter()
    }

    /// Read a locations file and append its records to the registry.
    ///
    /// Per-line failures are reported with their 1-based line number.
    /// Loading is not atomic across validation classes: records parsed
    /// before a failure stay appended, and the primary-location count is
    /// checked against the full registry once the whole file has been read.
    /// Callbacks fire only after a fully successful call, with the records
    /// added by this call.
    pub fn read<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let file = File::open(path.as_ref())?;
        let added = self.read_from(BufReader::new(file))?;
        info!("read {} locations from {:?}", added, path.as_ref());
        Ok(())
    }

    /// Stream variant of [`read`](Self::read): parse any buffered reader
    /// into the registry. Returns the number of records added.
    pub fn read_from<R: BufRead>(&mut self, reader: R) -> Result<usize> {
        let mut added = Vec::new();
        let mut lineno = 0;
        for line in reader.lines() {
            lineno += 1;
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let location =
                parse_line(line).map_err(|cause| LocationsSyntaxError { line: lineno, cause })?;
            self.check_duplicate(&location)
                .map_err(|cause| LocationsSyntaxError { line: lineno, cause })?;
            debug!("read location: {}", location.url());
            self.locations.push(location.clone());
            added.push(location);
        }

        // Whole-registry post-condition, attributed to the line after the
        // last one in the file.
        self.check_primary_count().map_err(|cause| LocationsSyntaxError {
            line: lineno + 1,
            cause,
        })?;

        let count = added.len();
        self.notify(&added);
        Ok(count)
    }

    /// Append one record, validating it against the registry.
    ///
    /// Duplicate origins and a second `primary` are rejected before the
    /// record is appended, so a failed add never changes the registry.
    /// A missing primary is not an error here: registries are allowed to
    /// grow incrementally, and the exactly-one-primary post-condition is
    /// enforced when reading a file.
    pub fn add(&mut self, location: Location) -> std::result::Result<(), LocationError> {
        self.check_duplicate(&location)?;
        if location.is_primary() && self.locations.iter().any(Location::is_primary) {
            return Err(LocationError::MultiplePrimary);
        }
        debug!("added location: {}", location.url());
        self.locations.push(location.clone());
        self.notify(&[location]);
        Ok(())
    }

    /// Append one host with the default scheme, port, and options.
    pub fn add_host(&mut self, host: &str) -> std::result::Result<(), LocationError> {
        self.add_host_with(host, "http", DEFAULT_PORT, "privileged")
    }

    /// Append one host, spelling out scheme, port, and the comma-separated
    /// option list. Performs the same validation as file parsing for
    /// exactly this record.
    pub fn add_host_with(
        &mut self,
        host: &str,
        scheme: &str,
        port: &str,
        options: &str,
    ) -> std::result::Result<(), LocationError> {
        self.add(Location::new(scheme, host, port, options)?)
    }

    fn check_duplicate(&self, location: &Location) -> std::result::Result<(), LocationError> {
        if self.locations.iter().any(|l| l.same_origin(location)) {
            return Err(LocationError::Duplicate(location.url()));
        }
        Ok(())
    }

    fn check_primary_count(&self) -> std::result::Result<(), LocationError> {
        match self.locations.iter().filter(|l| l.is_primary()).count() {
            0 => Err(LocationError::MissingPrimary),
            1 => Ok(()),
            _ => Err(LocationError::MultiplePrimary),
        }
    }

    fn notify(&mut self, added: &[Location]) {
        for callback in &mut self.callbacks {
            callback(added);
        }
    }
}

// Callbacks are opaque closures, so Debug can't be derived; show the
// records and just the callback count.
impl fmt::Debug for ServerLocations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerLocations")
            .field("locations", &self.locations)
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}

impl<'a> IntoIterator for &'a ServerLocations {
    type Item = &'a Location;
    type IntoIter = std::slice::Iter<'a, Location>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
