//! Discovery of a display path: connector, crtc and an overlay plane for a given format.
//!
//! Discovery is a first-match scan in kernel enumeration order. The first connector that is
//! connected and advertises a mode wins, and the first plane of its crtc that accepts the
//! format is used. Running it twice on unchanged hardware yields the same path.
//!
//! The scan is split into a part talking to the device, which gathers plain candidate
//! descriptions, and pure selection functions working on those.

use drm::control::{connector, crtc, encoder, plane, Device as ControlDevice, Mode, ResourceHandles};
use tracing::{debug, info, warn};

use super::error::{AccessError, Error};
use super::props::PropertyCache;
use crate::backend::allocator::format::FourccName;
use crate::utils::DevPath;

/// What discovery needs to know about a connector
#[derive(Debug, Clone)]
pub struct ConnectorCandidate {
    /// Handle of the connector
    pub handle: connector::Handle,
    /// Connection state
    pub state: connector::State,
    /// Advertised modes, preferred first
    pub modes: Vec<Mode>,
    /// Encoder currently driving the connector
    pub current_encoder: Option<encoder::Handle>,
    /// All encoders usable with this connector
    pub encoders: Vec<encoder::Handle>,
}

impl From<&connector::Info> for ConnectorCandidate {
    fn from(info: &connector::Info) -> Self {
        ConnectorCandidate {
            handle: info.handle(),
            state: info.state(),
            modes: info.modes().to_vec(),
            current_encoder: info.current_encoder(),
            encoders: info.encoders().to_vec(),
        }
    }
}

impl ConnectorCandidate {
    /// Returns true if the connector can light up a display
    pub fn is_usable(&self) -> bool {
        self.state == connector::State::Connected && !self.modes.is_empty()
    }
}

/// A connector with a crtc able to drive it
#[derive(Debug, Clone)]
pub struct OutputCandidate {
    /// Handle of the connector
    pub connector: connector::Handle,
    /// Encoder linking connector and crtc
    pub encoder: Option<encoder::Handle>,
    /// Crtc driving the connector
    pub crtc: crtc::Handle,
    /// Index of `crtc` in the device's crtc list
    pub crtc_index: usize,
    /// Mode to use, the connector's first one
    pub mode: Mode,
}

/// What discovery needs to know about a plane
#[derive(Debug, Clone)]
pub struct PlaneCandidate {
    /// Handle of the plane
    pub handle: plane::Handle,
    /// Bitmask of crtc indices the plane can be used with
    pub possible_crtcs: u32,
    /// Supported fourcc codes
    pub formats: Vec<u32>,
}

impl PlaneCandidate {
    /// Returns true if the plane can show `code` on the crtc at `crtc_index`
    pub fn accepts(&self, crtc_index: usize, code: u32) -> bool {
        crtc_index < 32 && self.possible_crtcs & (1 << crtc_index) != 0 && self.formats.contains(&code)
    }
}

/// Result of a successful discovery
#[derive(Debug, Clone)]
pub struct DisplayPath {
    /// Output to present on
    pub output: OutputCandidate,
    /// Plane to present with
    pub plane: plane::Handle,
    /// Properties of `plane`
    pub props: PropertyCache,
}

/// Index of `crtc` in the device's global crtc list
pub fn crtc_index(crtcs: &[crtc::Handle], crtc: crtc::Handle) -> Option<usize> {
    crtcs.iter().position(|c| *c == crtc)
}

/// Pick the first plane accepting `code` on the crtc at `crtc_index`
pub fn select_plane<'a>(
    planes: impl IntoIterator<Item = &'a PlaneCandidate>,
    crtc_index: usize,
    code: u32,
) -> Option<plane::Handle> {
    planes
        .into_iter()
        .find(|plane| plane.accepts(crtc_index, code))
        .map(|plane| plane.handle)
}

fn access_error<'a, D: DevPath>(fd: &'a D, errmsg: &'static str) -> impl FnOnce(std::io::Error) -> Error + 'a {
    move |source| {
        Error::Access(AccessError {
            errmsg,
            dev: fd.dev_path(),
            source,
        })
    }
}

fn connection_name(state: connector::State) -> &'static str {
    match state {
        connector::State::Connected => "connected",
        connector::State::Disconnected => "disconnected",
        connector::State::Unknown => "unknown",
    }
}

// The bound crtc of the current encoder, otherwise the first crtc any encoder could drive.
fn resolve_crtc<D: ControlDevice>(
    fd: &D,
    res: &ResourceHandles,
    conn: &ConnectorCandidate,
) -> Option<(Option<encoder::Handle>, crtc::Handle)> {
    if let Some(enc) = conn.current_encoder {
        match fd.get_encoder(enc) {
            Ok(info) => {
                if let Some(crtc) = info.crtc() {
                    return Some((Some(enc), crtc));
                }
            }
            Err(err) => warn!(?enc, "Failed to load encoder info: {}", err),
        }
    }

    conn.encoders
        .iter()
        .flat_map(|enc| fd.get_encoder(*enc))
        .find_map(|info| {
            res.filter_crtcs(info.possible_crtcs())
                .into_iter()
                .next()
                .map(|crtc| (Some(info.handle()), crtc))
        })
}

/// Enumerate all outputs that could be presented on, in connector order
///
/// Never returns an empty list: if no connector is connected this fails with
/// [`Error::NoConnectedOutput`], if none of them can be mapped to a crtc with
/// [`Error::NoCrtcMapping`].
pub fn connected_outputs<D>(fd: &D) -> Result<Vec<OutputCandidate>, Error>
where
    D: DevPath + ControlDevice,
{
    let res = fd
        .resource_handles()
        .map_err(access_error(fd, "Error loading drm resources"))?;

    let mut outputs = Vec::new();
    let mut unmapped = None;
    for handle in res.connectors() {
        let conn = match fd.get_connector(*handle, true) {
            Ok(info) => ConnectorCandidate::from(&info),
            Err(err) => {
                warn!(connector = ?handle, "Failed to load connector info: {}", err);
                continue;
            }
        };
        debug!(connector = ?conn.handle, "connector: {}", connection_name(conn.state));
        if !conn.is_usable() {
            continue;
        }

        let Some((encoder, crtc)) = resolve_crtc(fd, &res, &conn) else {
            warn!(connector = ?conn.handle, "No crtc available for connector");
            unmapped.get_or_insert(conn.handle);
            continue;
        };
        let Some(crtc_index) = crtc_index(res.crtcs(), crtc) else {
            warn!(connector = ?conn.handle, ?crtc, "Crtc not found in resource list");
            unmapped.get_or_insert(conn.handle);
            continue;
        };

        outputs.push(OutputCandidate {
            connector: conn.handle,
            encoder,
            crtc,
            crtc_index,
            mode: conn.modes[0],
        });
    }

    if outputs.is_empty() {
        return Err(match unmapped {
            Some(connector) => Error::NoCrtcMapping(connector),
            None => Error::NoConnectedOutput,
        });
    }
    Ok(outputs)
}

/// Enumerate all planes of the device, in plane order
pub fn plane_candidates<D>(fd: &D) -> Result<Vec<PlaneCandidate>, Error>
where
    D: DevPath + ControlDevice,
{
    let res = fd
        .resource_handles()
        .map_err(access_error(fd, "Error loading drm resources"))?;
    let planes = fd
        .plane_handles()
        .map_err(access_error(fd, "Error loading planes"))?;

    let mut candidates = Vec::with_capacity(planes.len());
    for handle in planes {
        let info = fd
            .get_plane(handle)
            .map_err(access_error(fd, "Error loading plane info"))?;
        let compatible = res.filter_crtcs(info.possible_crtcs());
        let possible_crtcs = res
            .crtcs()
            .iter()
            .enumerate()
            .filter(|(_, crtc)| compatible.contains(*crtc))
            .fold(0u32, |mask, (idx, _)| mask | 1 << idx);

        candidates.push(PlaneCandidate {
            handle,
            possible_crtcs,
            formats: info.formats().to_vec(),
        });
    }
    Ok(candidates)
}

/// Find a display path able to scan out frames of format `code`
///
/// Takes the first output of [`connected_outputs`] and the first matching plane of its crtc,
/// then snapshots the plane's properties.
#[profiling::function]
pub fn discover<D>(fd: &D, code: u32) -> Result<DisplayPath, Error>
where
    D: DevPath + ControlDevice,
{
    let mut outputs = connected_outputs(fd)?.into_iter();
    for output in outputs.clone() {
        debug!(
            connector = ?output.connector,
            encoder = ?output.encoder,
            crtc = ?output.crtc,
            "available output {}x{}",
            output.mode.size().0,
            output.mode.size().1,
        );
    }
    // connected_outputs never returns an empty list
    let output = outputs.next().ok_or(Error::NoConnectedOutput)?;

    let planes = plane_candidates(fd)?;
    let plane = select_plane(&planes, output.crtc_index, code).ok_or(Error::NoCompatiblePlane {
        crtc: output.crtc,
        format: FourccName(code),
    })?;
    let props = PropertyCache::snapshot(fd, plane)?;

    info!(
        connector = ?output.connector,
        crtc = ?output.crtc,
        ?plane,
        "Found {} plane for mode {:?}",
        FourccName(code),
        output.mode.name(),
    );

    Ok(DisplayPath { output, plane, props })
}
