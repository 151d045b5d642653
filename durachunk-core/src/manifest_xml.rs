//! XML document form of a [`ChunkManifest`], serialized via `quick-xml` + `serde`.
//!
//! ```xml
//! <?xml version="1.0" encoding="UTF-8"?>
//! <chunksManifest schemaVersion="0.3">
//!   <header>
//!     <sourceContent contentId="movie.mp4" mimetype="video/mp4" byteSize="2500" checksum="9f0c"/>
//!   </header>
//!   <chunks>
//!     <chunk chunkId="movie.mp4.dura-chunk-0000" index="0" byteSize="1000" checksum="41ab..."/>
//!   </chunks>
//! </chunksManifest>
//! ```
//!
//! Every value lives in an attribute. The deserializer trims element text,
//! attribute values come back verbatim.

use serde::{Deserialize, Serialize};

use crate::error::{ChunkError, Result};
use crate::manifest::{ChunkManifest, ManifestEntry, ManifestHeader};

pub const SCHEMA_VERSION: &str = "0.3";

/// Mimetype under which manifest documents are stored.
pub const MANIFEST_MIMETYPE: &str = "application/xml";

const XML_PROLOG: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";

#[derive(Serialize, Deserialize)]
#[serde(rename = "chunksManifest")]
struct ManifestDoc {
    #[serde(rename = "@schemaVersion")]
    schema_version: String,
    header: HeaderDoc,
    #[serde(default)]
    chunks: ChunksDoc,
}

#[derive(Serialize, Deserialize)]
struct HeaderDoc {
    #[serde(rename = "sourceContent")]
    source_content: SourceContentDoc,
}

#[derive(Serialize, Deserialize)]
struct SourceContentDoc {
    #[serde(rename = "@contentId")]
    content_id: String,
    #[serde(rename = "@mimetype")]
    mimetype: String,
    #[serde(rename = "@byteSize")]
    byte_size: String,
    #[serde(rename = "@checksum", default, skip_serializing_if = "Option::is_none")]
    checksum: Option<String>,
}

#[derive(Serialize, Deserialize, Default)]
struct ChunksDoc {
    #[serde(default)]
    chunk: Vec<ChunkDoc>,
}

#[derive(Serialize, Deserialize)]
struct ChunkDoc {
    #[serde(rename = "@chunkId")]
    chunk_id: String,
    #[serde(rename = "@index")]
    index: String,
    #[serde(rename = "@byteSize")]
    byte_size: String,
    #[serde(rename = "@checksum")]
    checksum: String,
}

/// Render `manifest` as an XML document. Chunks are written in index order.
pub fn serialize(manifest: &ChunkManifest) -> Result<String> {
    let header = manifest.header();
    let doc = ManifestDoc {
        schema_version: SCHEMA_VERSION.to_string(),
        header: HeaderDoc {
            source_content: SourceContentDoc {
                content_id: header.source_content_id.clone(),
                mimetype: header.source_mimetype.clone(),
                byte_size: header.source_byte_size.to_string(),
                checksum: header.source_checksum.clone(),
            },
        },
        chunks: ChunksDoc {
            chunk: manifest
                .entries()
                .map(|e| ChunkDoc {
                    chunk_id: e.chunk_id.clone(),
                    index: e.index.to_string(),
                    byte_size: e.byte_size.to_string(),
                    checksum: e.checksum.clone(),
                })
                .collect(),
        },
    };

    let mut body = String::new();
    let mut ser = quick_xml::se::Serializer::new(&mut body);
    ser.indent(' ', 2);
    doc.serialize(ser)
        .map_err(|e| ChunkError::MalformedManifest(format!("cannot serialize manifest: {e}")))?;
    Ok(format!("{XML_PROLOG}{body}"))
}

pub fn deserialize(xml: &str) -> Result<ChunkManifest> {
    if xml.trim().is_empty() {
        return Err(ChunkError::MalformedManifest("empty document".to_string()));
    }
    let doc: ManifestDoc = quick_xml::de::from_str(xml)
        .map_err(|e| ChunkError::MalformedManifest(format!("cannot parse manifest: {e}")))?;
    if doc.schema_version != SCHEMA_VERSION {
        return Err(ChunkError::MalformedManifest(format!(
            "unsupported schema version {:?}",
            doc.schema_version
        )));
    }

    let src = doc.header.source_content;
    if src.content_id.is_empty() {
        return Err(ChunkError::MalformedManifest("sourceContent has no contentId".to_string()));
    }
    let mut manifest = ChunkManifest::with_header(ManifestHeader {
        source_byte_size: parse_number(&src.byte_size, "sourceContent/byteSize")?,
        source_content_id: src.content_id,
        source_mimetype: src.mimetype,
        source_checksum: src.checksum,
    });

    for chunk in doc.chunks.chunk {
        let index = parse_number(&chunk.index, "chunk/@index")?;
        let byte_size = parse_number(&chunk.byte_size, "chunk/byteSize")?;
        if chunk.chunk_id.is_empty() {
            return Err(ChunkError::MalformedManifest(format!("chunk {index} has no chunkId")));
        }
        manifest
            .insert_entry(ManifestEntry {
                chunk_id: chunk.chunk_id,
                checksum: chunk.checksum,
                index,
                byte_size,
            })
            .map_err(|e| ChunkError::MalformedManifest(e.to_string()))?;
    }
    Ok(manifest)
}

/// Decode a manifest from raw stored bytes (must be UTF-8).
pub fn deserialize_bytes(bytes: &[u8]) -> Result<ChunkManifest> {
    let xml = std::str::from_utf8(bytes)
        .map_err(|e| ChunkError::MalformedManifest(format!("document is not UTF-8: {e}")))?;
    deserialize(xml)
}

fn parse_number<T: std::str::FromStr>(raw: &str, field: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| ChunkError::MalformedManifest(format!("{field} is not a number: {raw:?}")))
}
