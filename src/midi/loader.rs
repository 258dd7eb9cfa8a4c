use std::fs;
use std::path::Path;

use log::{debug, trace, warn};
use rayon::prelude::*;
use thousands::Separable;

use crate::error::{DecodeError, LoadError};
use crate::midi::cursor::ByteCursor;
use crate::midi::song::{Format, Header, META_END_OF_TRACK, RawEvent, Song, Track, VoiceKind};

const HEADER_MAGIC: &[u8; 4] = b"MThd";
const TRACK_MAGIC: &[u8; 4] = b"MTrk";

/// Load and decode a MIDI file from disk.
pub fn load_midi_file<P: AsRef<Path>>(filename: P) -> Result<Song, LoadError> {
    let data = fs::read(&filename)?;
    Ok(decode(&data)?)
}

/// Decode a Standard MIDI File.
///
/// Track chunks are located sequentially and then decoded in parallel. The
/// first failing track aborts the whole decode.
pub fn decode(bytes: &[u8]) -> Result<Song, DecodeError> {
    let mut cursor = ByteCursor::new(bytes);
    let header = read_header(&mut cursor)?;

    let chunks = locate_tracks(&mut cursor, header.track_count as usize)?;

    let tracks = chunks
        .par_iter()
        .enumerate()
        .map(|(index, body)| {
            decode_track(body).inspect_err(|err| warn!("Track {index} failed to decode: {err}"))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let song = Song { header, tracks };
    debug!(
        "Decoded {:?} song: {} tracks, {} events, {} ticks at {} tpq",
        song.header.format,
        song.tracks.len(),
        song.event_count().separate_with_commas(),
        song.total_ticks().separate_with_commas(),
        song.header.ticks_per_quarter
    );
    Ok(song)
}

fn read_header(cursor: &mut ByteCursor<'_>) -> Result<Header, DecodeError> {
    let magic = cursor
        .read_bytes(4)
        .map_err(|_| DecodeError::InvalidHeader("Not a MIDI file".into()))?;
    if magic != HEADER_MAGIC {
        return Err(DecodeError::InvalidHeader("Not a MIDI file".into()));
    }

    let header_len = cursor.read_u32_be()?;
    if header_len != 6 {
        return Err(DecodeError::InvalidHeader(format!(
            "Invalid header length {header_len}"
        )));
    }

    let format = cursor.read_u16_be()?;
    let format = Format::from_u16(format)
        .ok_or_else(|| DecodeError::InvalidHeader(format!("Unknown format {format}")))?;

    let track_count = cursor.read_u16_be()?;

    let time_div = cursor.read_u16_be()?;
    if (time_div & 0x8000) != 0 {
        return Err(DecodeError::InvalidHeader(
            "SMPTE timing is not supported".into(),
        ));
    }
    if time_div == 0 {
        return Err(DecodeError::InvalidHeader(
            "Time division of zero ticks per quarter note".into(),
        ));
    }

    Ok(Header {
        format,
        track_count,
        ticks_per_quarter: time_div,
    })
}

/// Slice out the body of every declared track chunk.
///
/// A declared length running past the end of the data is clamped, so
/// encoders that overstate it still load.
fn locate_tracks<'a>(
    cursor: &mut ByteCursor<'a>,
    count: usize,
) -> Result<Vec<&'a [u8]>, DecodeError> {
    let mut chunks = Vec::with_capacity(count);
    for track in 0..count {
        let magic = cursor.read_bytes(4)?;
        if magic != TRACK_MAGIC {
            let mut found = [0u8; 4];
            found.copy_from_slice(magic);
            return Err(DecodeError::InvalidTrackHeader { track, found });
        }

        let declared = cursor.read_u32_be()? as usize;
        let length = declared.min(cursor.remaining());
        if length < declared {
            debug!("Track {track} declares {declared} bytes but only {length} remain");
        }
        chunks.push(cursor.read_bytes(length)?);
    }
    Ok(chunks)
}

/// Decode one track chunk body into absolute-tick events.
///
/// Stops at End-of-Track or when the body runs out, whichever comes first.
pub fn decode_track(body: &[u8]) -> Result<Track, DecodeError> {
    let mut cursor = ByteCursor::new(body);
    let mut track = Track::default();
    let mut tick: u64 = 0;
    let mut running_status: Option<u8> = None;

    while !cursor.is_empty() {
        tick = tick.saturating_add(cursor.read_vlq()?);

        let offset = cursor.position();
        let byte = cursor.read_u8()?;

        // Running status: a data byte where a status byte should be
        let (status, first_data) = if byte >= 0x80 {
            (byte, None)
        } else {
            match running_status {
                Some(status) => (status, Some(byte)),
                None => {
                    return Err(DecodeError::UnsupportedEventType {
                        status: byte,
                        offset,
                    });
                }
            }
        };

        if let Some(kind) = VoiceKind::from_status(status) {
            running_status = Some(status);
            let mut data = Vec::with_capacity(kind.data_len());
            data.extend(first_data);
            while data.len() < kind.data_len() {
                data.push(cursor.read_u8()?);
            }
            trace!("tick {tick}: {kind:?} 0x{status:02X} {data:?}");
            track.events.push(RawEvent {
                tick,
                status,
                data,
                meta_type: None,
            });
            continue;
        }

        match status {
            0xFF => {
                let meta_type = cursor.read_u8()?;
                let len = cursor.read_vlq()? as usize;
                let data = cursor.read_bytes(len)?.to_vec();
                let event = RawEvent {
                    tick,
                    status,
                    data,
                    meta_type: Some(meta_type),
                };
                if track.name.is_none() {
                    track.name = event.track_name();
                }
                track.events.push(event);
                if meta_type == META_END_OF_TRACK {
                    break;
                }
            }
            0xF0 | 0xF7 => {
                let len = cursor.read_vlq()? as usize;
                cursor.read_bytes(len)?;
                running_status = None;
                trace!("tick {tick}: skipped {len} byte SysEx");
            }
            _ => return Err(DecodeError::UnsupportedEventType { status, offset }),
        }
    }

    Ok(track)
}
