//! Paginated previews of collection types

use super::{InspectorJob, Outcome};
use crate::JobStatus;
use crate::events::Emitter;
use crate::inspector::result::*;
use keyscope_core::{CapReason, InspectorLimits, KeyscopeError, RespValue, Result, key_command};
use keyscope_driver_redis::{count_reply, parse_scan_reply};
use keyscope_redact::RedactionMetadata;
use std::collections::BTreeMap;

/// Entries gathered across SCAN-family pages.
///
/// Keyed by field or member so that elements the server returns twice are
/// kept once.
struct Accumulator<V> {
    entries: BTreeMap<String, V>,
    bytes: usize,
    cap: Option<CapReason>,
    redaction: RedactionMetadata,
}

impl<V> Accumulator<V> {
    fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            bytes: 0,
            cap: None,
            redaction: RedactionMetadata::none(),
        }
    }

    /// Add one element of `size` raw bytes. Returns `false` once a cap has
    /// fired; `value` is only evaluated for elements that are kept.
    fn admit(
        &mut self,
        key: String,
        size: usize,
        limits: &InspectorLimits,
        value: impl FnOnce() -> (V, RedactionMetadata),
    ) -> bool {
        if self.cap.is_some() {
            return false;
        }
        if self.entries.contains_key(&key) {
            return true;
        }
        if let Some(cap) = check_caps(self.entries.len(), self.bytes, size, limits) {
            self.cap = Some(cap);
            return false;
        }

        let (value, metadata) = value();
        self.redaction.merge(&metadata);
        self.bytes += size;
        self.entries.insert(key, value);
        true
    }
}

fn check_caps(
    count: usize,
    bytes: usize,
    size: usize,
    limits: &InspectorLimits,
) -> Option<CapReason> {
    if count >= limits.max_entries {
        Some(CapReason::CollectionEntryLimit)
    } else if bytes + size > limits.max_bytes {
        Some(CapReason::CollectionByteLimit)
    } else {
        None
    }
}

fn collection_status(
    ttl: Option<i64>,
    fetched_count: usize,
    cap: Option<CapReason>,
    has_more: bool,
) -> PreviewStatus {
    let mut status = PreviewStatus::new(ttl).with_cap(cap);
    status.fetched_count = fetched_count;
    status.has_more = has_more;
    status.is_partial = has_more;
    status
}

fn element_bytes(command: &'static str, value: RespValue) -> Result<Vec<u8>> {
    value.into_bytes().ok_or_else(|| {
        KeyscopeError::invalid_response(command, "element is not a string")
    })
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Elements of an array reply, for the commands that are not SCAN-shaped
fn array_reply(command: &'static str, reply: RespValue) -> Result<Vec<RespValue>> {
    match reply {
        RespValue::Array(items) => Ok(items),
        RespValue::Error(message) => Err(KeyscopeError::CommandFailed(message)),
        other => Err(KeyscopeError::invalid_response(
            command,
            format!("expected an array, got {}", other.kind()),
        )),
    }
}

/// Split a flat `[a, b, a, b, ...]` list into pairs
fn pairs(command: &'static str, items: Vec<RespValue>) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
    if items.len() % 2 != 0 {
        return Err(KeyscopeError::invalid_response(
            command,
            format!("expected pairs, got {} elements", items.len()),
        ));
    }
    let mut items = items.into_iter();
    let mut out = Vec::with_capacity(items.len() / 2);
    while let (Some(a), Some(b)) = (items.next(), items.next()) {
        out.push((element_bytes(command, a)?, element_bytes(command, b)?));
    }
    Ok(out)
}

impl InspectorJob {
    /// Drive `scan` (HSCAN/SSCAN/ZSCAN) until the cursor is exhausted, a cap
    /// fires or cancellation is observed between pages.
    ///
    /// `absorb` folds one page into the accumulator, `build` renders it.
    async fn scan_pages<V>(
        &self,
        scan: &'static str,
        chunk_size: u32,
        ttl: Option<i64>,
        emitter: &Emitter<'_, InspectionResult>,
        mut absorb: impl FnMut(Vec<RespValue>, &mut Accumulator<V>) -> Result<()>,
        build: impl Fn(&Accumulator<V>, PreviewStatus) -> InspectionResult,
    ) -> Result<Outcome> {
        let mut acc = Accumulator::new();
        let mut cursor = "0".to_string();
        let mut has_more = true;
        let count = chunk_size.to_string();

        loop {
            if emitter.token().is_cancelled() {
                let status = collection_status(ttl, acc.entries.len(), acc.cap, has_more);
                return Ok((JobStatus::Cancelled, build(&acc, status)));
            }

            let reply = self
                .executor
                .execute(&key_command(
                    scan,
                    &self.key,
                    &[cursor.as_str(), "COUNT", count.as_str()],
                ))
                .await?;
            let page = parse_scan_reply(scan, reply)?;
            absorb(page.items, &mut acc)?;
            cursor = page.cursor;

            if acc.cap.is_none() && acc.entries.len() >= self.limits.max_entries && cursor != "0"
            {
                acc.cap = Some(CapReason::CollectionEntryLimit);
            }
            has_more = cursor != "0" || acc.cap.is_some();

            let status = collection_status(ttl, acc.entries.len(), acc.cap, has_more);
            let result = build(&acc, status);
            emitter.progress(result.clone()).await;

            if !has_more || acc.cap.is_some() {
                return Ok((JobStatus::Completed, result));
            }
        }
    }

    pub(super) async fn inspect_hash(
        &self,
        ttl: Option<i64>,
        emitter: &Emitter<'_, InspectionResult>,
    ) -> Result<Outcome> {
        let total_fields = count_reply(self.executor.as_ref(), "HLEN", &self.key).await?;

        let absorb = |items: Vec<RespValue>, acc: &mut Accumulator<String>| -> Result<()> {
            for (field, value) in pairs("HSCAN", items)? {
                let size = field.len() + value.len();
                let kept = acc.admit(lossy(&field), size, &self.limits, || {
                    let redacted = self.engine.redact_field_bytes(&field, &value);
                    (redacted.text, redacted.metadata)
                });
                if !kept {
                    break;
                }
            }
            Ok(())
        };
        let build = |acc: &Accumulator<String>, status| {
            InspectionResult::Hash(HashPreview {
                key: self.display_key.clone(),
                status,
                total_fields,
                entries: acc
                    .entries
                    .iter()
                    .map(|(field, value)| HashEntry {
                        field: field.clone(),
                        value: value.clone(),
                    })
                    .collect(),
                redaction: acc.redaction.clone(),
            })
        };

        self.scan_pages("HSCAN", self.limits.hash_chunk_size, ttl, emitter, absorb, build)
            .await
    }

    pub(super) async fn inspect_set(
        &self,
        ttl: Option<i64>,
        emitter: &Emitter<'_, InspectionResult>,
    ) -> Result<Outcome> {
        let total_count = count_reply(self.executor.as_ref(), "SCARD", &self.key).await?;

        let absorb = |items: Vec<RespValue>, acc: &mut Accumulator<String>| -> Result<()> {
            for item in items {
                let member = element_bytes("SSCAN", item)?;
                let kept = acc.admit(lossy(&member), member.len(), &self.limits, || {
                    let redacted = self.engine.redact_bytes(&member);
                    (redacted.text, redacted.metadata)
                });
                if !kept {
                    break;
                }
            }
            Ok(())
        };
        let build = |acc: &Accumulator<String>, status| {
            InspectionResult::Set(SetPreview {
                key: self.display_key.clone(),
                status,
                total_count,
                members: acc.entries.values().cloned().collect(),
                redaction: acc.redaction.clone(),
            })
        };

        self.scan_pages(
            "SSCAN",
            self.limits.collection_chunk_size,
            ttl,
            emitter,
            absorb,
            build,
        )
        .await
    }

    pub(super) async fn inspect_zset(
        &self,
        ttl: Option<i64>,
        emitter: &Emitter<'_, InspectionResult>,
    ) -> Result<Outcome> {
        let total_count = count_reply(self.executor.as_ref(), "ZCARD", &self.key).await?;

        let absorb = |items: Vec<RespValue>, acc: &mut Accumulator<ZsetMember>| -> Result<()> {
            for (member, score_text) in pairs("ZSCAN", items)? {
                let score = std::str::from_utf8(&score_text)
                    .ok()
                    .and_then(|s| s.trim().parse::<f64>().ok())
                    .ok_or_else(|| {
                        KeyscopeError::invalid_response(
                            "ZSCAN",
                            format!("score {:?} is not a number", lossy(&score_text)),
                        )
                    })?;
                let size = member.len() + score_text.len();
                let kept = acc.admit(lossy(&member), size, &self.limits, || {
                    let redacted = self.engine.redact_bytes(&member);
                    let entry = ZsetMember {
                        member: redacted.text,
                        score,
                    };
                    (entry, redacted.metadata)
                });
                if !kept {
                    break;
                }
            }
            Ok(())
        };
        let build = |acc: &Accumulator<ZsetMember>, status| {
            InspectionResult::Zset(ZsetPreview {
                key: self.display_key.clone(),
                status,
                total_count,
                members: acc.entries.values().cloned().collect(),
                redaction: acc.redaction.clone(),
            })
        };

        self.scan_pages(
            "ZSCAN",
            self.limits.collection_chunk_size,
            ttl,
            emitter,
            absorb,
            build,
        )
        .await
    }

    /// Fixed `LRANGE` windows in server order
    pub(super) async fn inspect_list(
        &self,
        ttl: Option<i64>,
        emitter: &Emitter<'_, InspectionResult>,
    ) -> Result<Outcome> {
        let total_count = count_reply(self.executor.as_ref(), "LLEN", &self.key).await?;
        let chunk = u64::from(self.limits.collection_chunk_size);

        let mut items: Vec<ListItem> = Vec::new();
        let mut bytes = 0;
        let mut cap = None;
        let mut redaction = RedactionMetadata::none();
        let mut start = 0u64;

        let build = |items: &Vec<ListItem>, redaction: &RedactionMetadata, status| {
            InspectionResult::List(ListPreview {
                key: self.display_key.clone(),
                status,
                total_count,
                items: items.clone(),
                redaction: redaction.clone(),
            })
        };

        while start < total_count {
            if emitter.token().is_cancelled() {
                let status = collection_status(ttl, items.len(), cap, true);
                return Ok((JobStatus::Cancelled, build(&items, &redaction, status)));
            }

            let first = start.to_string();
            let last = (start + chunk - 1).to_string();
            let reply = self
                .executor
                .execute(&key_command(
                    "LRANGE",
                    &self.key,
                    &[first.as_str(), last.as_str()],
                ))
                .await?;
            let page = array_reply("LRANGE", reply)?;
            if page.is_empty() {
                // Trimmed while we were reading
                break;
            }

            let page_len = page.len() as u64;
            for (offset, value) in page.into_iter().enumerate() {
                let value = element_bytes("LRANGE", value)?;
                if let Some(reason) = check_caps(items.len(), bytes, value.len(), &self.limits) {
                    cap = Some(reason);
                    break;
                }
                bytes += value.len();
                let redacted = self.engine.redact_bytes(&value);
                redaction.merge(&redacted.metadata);
                items.push(ListItem {
                    index: start + offset as u64,
                    value: redacted.text,
                });
            }
            start += page_len;

            if cap.is_none() && items.len() >= self.limits.max_entries && start < total_count {
                cap = Some(CapReason::CollectionEntryLimit);
            }
            let has_more = start < total_count || cap.is_some();

            let status = collection_status(ttl, items.len(), cap, has_more);
            let result = build(&items, &redaction, status);
            emitter.progress(result.clone()).await;

            if !has_more || cap.is_some() {
                return Ok((JobStatus::Completed, result));
            }
        }

        let status = collection_status(ttl, items.len(), cap, false);
        Ok((JobStatus::Completed, build(&items, &redaction, status)))
    }

    /// One `XREVRANGE` call, newest entries first
    pub(super) async fn inspect_stream(
        &self,
        ttl: Option<i64>,
        emitter: &Emitter<'_, InspectionResult>,
    ) -> Result<Outcome> {
        let total_count = count_reply(self.executor.as_ref(), "XLEN", &self.key).await?;

        let mut entries = Vec::new();
        let mut bytes = 0;
        let mut cap = None;
        let mut redaction = RedactionMetadata::none();

        let build = |entries: Vec<StreamEntry>, redaction: RedactionMetadata, status| {
            InspectionResult::Stream(StreamPreview {
                key: self.display_key.clone(),
                status,
                total_count,
                entries,
                redaction,
            })
        };

        if emitter.token().is_cancelled() {
            let status = collection_status(ttl, 0, None, total_count > 0);
            return Ok((JobStatus::Cancelled, build(entries, redaction, status)));
        }

        let count = self.limits.stream_count.to_string();
        let reply = self
            .executor
            .execute(&key_command(
                "XREVRANGE",
                &self.key,
                &["+", "-", "COUNT", count.as_str()],
            ))
            .await?;

        for raw in array_reply("XREVRANGE", reply)? {
            let (id, fields) = parse_stream_entry(raw)?;
            let size = id.len()
                + fields
                    .iter()
                    .map(|(field, value)| field.len() + value.len())
                    .sum::<usize>();
            if let Some(reason) = check_caps(entries.len(), bytes, size, &self.limits) {
                cap = Some(reason);
                break;
            }
            bytes += size;

            let fields = fields
                .into_iter()
                .map(|(field, value)| {
                    let redacted = self.engine.redact_field_bytes(&field, &value);
                    redaction.merge(&redacted.metadata);
                    StreamField {
                        field: lossy(&field),
                        value: redacted.text,
                    }
                })
                .collect();
            entries.push(StreamEntry { id, fields });
        }

        let has_more = (entries.len() as u64) < total_count || cap.is_some();
        let status = collection_status(ttl, entries.len(), cap, has_more);
        let result = build(entries, redaction, status);
        emitter.progress(result.clone()).await;
        Ok((JobStatus::Completed, result))
    }
}

/// `[id, [field, value, ...]]`
fn parse_stream_entry(raw: RespValue) -> Result<(String, Vec<(Vec<u8>, Vec<u8>)>)> {
    let malformed = || KeyscopeError::invalid_response("XREVRANGE", "entry is not [id, fields]");

    let [id, fields]: [RespValue; 2] = raw
        .into_array()
        .ok_or_else(malformed)?
        .try_into()
        .map_err(|_| malformed())?;
    let id = id.into_text().ok_or_else(malformed)?;
    let fields = pairs("XREVRANGE", fields.into_array().ok_or_else(malformed)?)?;
    Ok((id, fields))
}
