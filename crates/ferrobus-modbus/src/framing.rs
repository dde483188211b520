// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Reading whole ADUs off a byte stream.
//!
//! Used by the client channels and by the emulator's servers. Readers never
//! consume bytes past the end of the ADU they return, except for RTU frames of
//! unknown length, which end at the first inter-frame silence.
//!
//! On the serving side a request that stops short of its predicted length
//! also ends at the first silence, see [`read_rtu_request`].

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::timeout;

use crate::codec::rtu::{self, AduLength, MAX_ADU_LEN};
use crate::codec::tcp::{MbapHeader, MBAP_PREFIX_LEN};
use crate::error::{ConnectionError, ModbusResult, ProtocolError};

/// Reads one MBAP-framed ADU.
///
/// Returns `Ok(None)` on a clean end of stream before the first byte.
pub async fn read_tcp_adu<S>(stream: &mut S) -> ModbusResult<Option<(MbapHeader, Vec<u8>)>>
where
    S: AsyncRead + Unpin + ?Sized,
{
    let mut prefix = [0u8; MBAP_PREFIX_LEN];
    let first = stream.read(&mut prefix).await?;
    if first == 0 {
        return Ok(None);
    }
    stream.read_exact(&mut prefix[first..]).await?;

    let header = MbapHeader::parse(&prefix)?;
    let mut frame = vec![0u8; usize::from(header.length)];
    stream.read_exact(&mut frame).await?;
    Ok(Some((header, frame)))
}

/// Reads one RTU ADU (frame plus CRC) using `predict` to find its end.
///
/// When `predict` cannot tell the length, bytes are collected until the line
/// stays silent for `silence`. Returns `Ok(None)` on a clean end of stream
/// before the first byte.
pub async fn read_rtu_adu<S>(
    stream: &mut S,
    predict: fn(&[u8]) -> AduLength,
    silence: Duration,
) -> ModbusResult<Option<Vec<u8>>>
where
    S: AsyncRead + Unpin + ?Sized,
{
    read_rtu(stream, predict, silence, false).await
}

/// Reads one RTU request ADU.
///
/// Like [`read_rtu_adu`] with [`rtu::request_adu_length`], except that once a
/// frame has started, a gap of `silence` ends it even if fewer bytes arrived
/// than its header announced. The short frame is returned as received and
/// left to the CRC check and the request parser.
pub async fn read_rtu_request<S>(stream: &mut S, silence: Duration) -> ModbusResult<Option<Vec<u8>>>
where
    S: AsyncRead + Unpin + ?Sized,
{
    read_rtu(stream, rtu::request_adu_length, silence, true).await
}

async fn read_rtu<S>(
    stream: &mut S,
    predict: fn(&[u8]) -> AduLength,
    silence: Duration,
    end_on_stall: bool,
) -> ModbusResult<Option<Vec<u8>>>
where
    S: AsyncRead + Unpin + ?Sized,
{
    let mut adu = Vec::with_capacity(MAX_ADU_LEN);
    let mut chunk = [0u8; MAX_ADU_LEN];

    loop {
        let want = match predict(&adu) {
            AduLength::Complete(total) if adu.len() >= total => return Ok(Some(adu)),
            AduLength::Complete(total) => total - adu.len(),
            AduLength::NeedMore => 1,
            AduLength::Unknown => {
                return read_until_silence(stream, adu, &mut chunk, silence).await.map(Some)
            }
        };

        let buf = &mut chunk[..want.min(MAX_ADU_LEN)];
        let n = if end_on_stall && !adu.is_empty() {
            match timeout(silence, stream.read(buf)).await {
                Ok(read) => read?,
                Err(_) => return Ok(Some(adu)),
            }
        } else {
            stream.read(buf).await?
        };
        if n == 0 {
            if adu.is_empty() {
                return Ok(None);
            }
            return Err(ConnectionError::closed(None).into());
        }
        adu.extend_from_slice(&chunk[..n]);

        if adu.len() > MAX_ADU_LEN {
            return Err(ProtocolError::unexpected(format!(
                "RTU frame exceeds {MAX_ADU_LEN} bytes"
            ))
            .into());
        }
    }
}

async fn read_until_silence<S>(
    stream: &mut S,
    mut adu: Vec<u8>,
    chunk: &mut [u8],
    silence: Duration,
) -> ModbusResult<Vec<u8>>
where
    S: AsyncRead + Unpin + ?Sized,
{
    loop {
        match timeout(silence, stream.read(chunk)).await {
            Err(_) | Ok(Ok(0)) => return Ok(adu),
            Ok(Ok(n)) => {
                adu.extend_from_slice(&chunk[..n]);
                if adu.len() > MAX_ADU_LEN {
                    return Err(ProtocolError::unexpected(format!(
                        "RTU frame exceeds {MAX_ADU_LEN} bytes"
                    ))
                    .into());
                }
            }
            Ok(Err(e)) => return Err(e.into()),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
