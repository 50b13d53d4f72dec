use core::convert::TryFrom;

use nom::bytes::complete::{take, take_till as take_till_complete, take_till1};
use nom::bytes::streaming::{tag, take_till};
use nom::character::complete::char;
use nom::combinator::{all_consuming, map, map_res, rest, verify};
use nom::multi::length_data;
use nom::number::complete::{be_u16, u8};
use nom::number::streaming::u8 as streaming_u8;
use nom::sequence::{delimited, preceded, separated_pair, tuple};
use nom::Err::Incomplete;
use nom::IResult;

use crate::frame::{Frame, Payload, MIN_FRAME_LEN};
use crate::types::DeviceAddress;
use crate::PREFIX;

type Buf = [u8];

/// Parse the checksum-stripped body of a frame. The length and checksum
/// have already been verified by the caller.
pub(crate) fn frame_body(buf: &Buf) -> IResult<&Buf, Frame> {
    let (buf, (_prefix, _len, kind, source, target, _reserved, opcode, cmd_type)) = header(buf)?;
    let (buf, payload) = payload_bytes(buf)?;
    Ok((
        buf,
        Frame {
            kind,
            source: DeviceAddress::from(source),
            target: DeviceAddress::from(target),
            opcode,
            cmd_type,
            payload,
        },
    ))
}

type Header<'a> = (u8, u8, u8, u16, u16, &'a Buf, u8, u8);

fn header(buf: &Buf) -> IResult<&Buf, Header<'_>> {
    tuple((u8, u8, u8, be_u16, be_u16, take(4usize), u8, u8))(buf)
}

fn payload_bytes(buf: &Buf) -> IResult<&Buf, Payload> {
    all_consuming(map_res(length_data(u8), Payload::try_from))(buf)
}

#[derive(PartialEq, Debug)]
pub(crate) enum SplitToken<'a> {
    /// Bytes starting with the prefix and as long as the length byte says.
    Candidate(&'a Buf),
    /// Bytes that can't start a frame.
    Skip,
    NeedData,
}

/// Find the next frame candidate in a receive buffer.
///
/// Returns the number of bytes to consume along with the token. Candidates
/// still have to pass [`decode`](crate::frame::decode).
pub(crate) fn split_frame(buf: &Buf) -> (usize, SplitToken<'_>) {
    match take_till::<_, _, nom::error::Error<&Buf>>(|b| b == PREFIX)(buf) {
        Ok((_, junk)) if !junk.is_empty() => return (junk.len(), SplitToken::Skip),
        Ok(_) => {}
        Err(_) if buf.is_empty() => return (0, SplitToken::NeedData),
        Err(_) => return (buf.len(), SplitToken::Skip),
    }
    match candidate(buf) {
        Ok((remaining, frame)) => (buf.len() - remaining.len(), SplitToken::Candidate(frame)),
        Err(Incomplete(_)) => (0, SplitToken::NeedData),
        // impossible length byte, drop the prefix and resync
        Err(_) => (1, SplitToken::Skip),
    }
}

fn candidate(buf: &Buf) -> IResult<&Buf, &Buf> {
    let (_, len) = frame_len(buf)?;
    nom::bytes::streaming::take(len)(buf)
}

fn frame_len(buf: &Buf) -> IResult<&Buf, u8> {
    preceded(
        tag(&[PREFIX][..]),
        verify(streaming_u8, |len: &u8| usize::from(*len) >= MIN_FRAME_LEN),
    )(buf)
}

/// One line of an INI file.
#[derive(PartialEq, Debug)]
pub(crate) enum IniLine<'a> {
    Section(&'a str),
    Entry { key: &'a str, value: &'a str },
    /// Blank lines, comments and anything unparseable.
    Other,
}

pub(crate) fn ini_line(line: &str) -> IniLine<'_> {
    let line = line.trim();
    if line.starts_with(';') || line.starts_with('#') {
        return IniLine::Other;
    }
    if let Ok((_, name)) = ini_section(line) {
        return IniLine::Section(name);
    }
    match ini_entry(line) {
        Ok((_, (key, value))) => IniLine::Entry { key, value },
        Err(_) => IniLine::Other,
    }
}

fn ini_section(line: &str) -> IResult<&str, &str> {
    delimited(
        char('['),
        map(take_till_complete(|c: char| c == ']'), str::trim),
        char(']'),
    )(line)
}

fn ini_entry(line: &str) -> IResult<&str, (&str, &str)> {
    separated_pair(
        map(take_till1(|c: char| c == '='), str::trim),
        char('='),
        map(rest, str::trim),
    )(line)
}
