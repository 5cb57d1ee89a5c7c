//! Content type sniffing
//!
//! Stored blobs are named by CID and carry no extension, so the type is read
//! from the leading bytes of the file.

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// Bytes read from the start of a file for sniffing
pub const SNIFF_LEN: usize = 512;

/// Guess a MIME type from the first bytes of some content
pub fn sniff_content_type(head: &[u8]) -> &'static str {
    match head {
        [b'I', b'D', b'3', ..] => "audio/mpeg",
        [b'f', b'L', b'a', b'C', ..] => "audio/flac",
        [b'O', b'g', b'g', b'S', ..] => "audio/ogg",
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'A', b'V', b'E', ..] => "audio/wav",
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => "image/webp",
        [_, _, _, _, b'f', b't', b'y', b'p', b'M', b'4', b'A', ..] => "audio/mp4",
        [_, _, _, _, b'f', b't', b'y', b'p', ..] => "video/mp4",
        [0x89, b'P', b'N', b'G', ..] => "image/png",
        [0xFF, 0xD8, 0xFF, ..] => "image/jpeg",
        [b'G', b'I', b'F', b'8', ..] => "image/gif",
        [0x1A, 0x45, 0xDF, 0xA3, ..] => "video/webm",
        [b'%', b'P', b'D', b'F', ..] => "application/pdf",
        [b'{', ..] | [b'[', ..] => "application/json",
        // MPEG audio frame sync (ADTS AAC and MP3 without an ID3 tag)
        [0xFF, second, ..] if second & 0xF6 == 0xF0 => "audio/aac",
        [0xFF, second, ..] if second & 0xE0 == 0xE0 => "audio/mpeg",
        _ => "application/octet-stream",
    }
}

/// Whether a sniffed MIME type is audio
pub fn is_audio(content_type: &str) -> bool {
    content_type.starts_with("audio/")
}

/// Sniff the content type of an open file, leaving it positioned at the start
pub async fn sniff_file(file: &mut File) -> std::io::Result<&'static str> {
    file.rewind().await?;
    let mut head = vec![0u8; SNIFF_LEN];
    let mut filled = 0;

    while filled < SNIFF_LEN {
        let n = file.read(&mut head[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }

    file.rewind().await?;
    Ok(sniff_content_type(&head[..filled]))
}
