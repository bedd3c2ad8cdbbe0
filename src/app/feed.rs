use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use tracing::{debug, warn};

use crate::db::{Episode, Podcast};
use crate::device::Bookmark;
use crate::http::{RetryPolicy, get_text_with_retries};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct Feed {
    pub(crate) title: String,
    pub(crate) items: Vec<FeedItem>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct FeedItem {
    pub(crate) guid: Option<String>,
    pub(crate) title: String,
    pub(crate) pub_date: Option<String>,
    pub(crate) enclosure_url: Option<String>,
    pub(crate) duration: Option<String>,
}

pub(crate) fn fetch_feed(url: &str) -> Result<Feed> {
    let body = get_text_with_retries(url, RetryPolicy::feed())
        .map_err(|err| anyhow!(err))
        .with_context(|| format!("failed to fetch feed {url}"))?;
    parse_feed(&body).with_context(|| format!("failed to parse feed {url}"))
}

pub(crate) fn parse_feed(xml: &str) -> Result<Feed> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut feed = Feed::default();
    let mut path: Vec<String> = Vec::new();
    let mut text = String::new();
    let mut item: Option<FeedItem> = None;

    loop {
        match reader.read_event()? {
            Event::Start(start) => {
                let name = element_name(&start);
                if name == "item" {
                    item = Some(FeedItem::default());
                }
                if name == "enclosure" {
                    read_enclosure(&start, item.as_mut())?;
                }
                path.push(name);
                text.clear();
            }
            Event::Empty(start) => {
                if element_name(&start) == "enclosure" {
                    read_enclosure(&start, item.as_mut())?;
                }
            }
            Event::Text(raw) => text.push_str(&raw.unescape()?),
            Event::CData(raw) => text.push_str(&String::from_utf8_lossy(&raw.into_inner())),
            Event::End(_) => {
                let Some(name) = path.pop() else {
                    continue;
                };
                let parent = path.last().map(String::as_str);
                match (parent, name.as_str()) {
                    (Some("channel"), "item") => {
                        if let Some(done) = item.take() {
                            feed.items.push(done);
                        }
                    }
                    (Some("channel"), "title") => feed.title = text.trim().to_string(),
                    (Some("item"), field) => {
                        if let Some(current) = item.as_mut() {
                            let value = text.trim().to_string();
                            match field {
                                "guid" => current.guid = Some(value),
                                "title" => current.title = value,
                                "pubDate" => current.pub_date = Some(value),
                                "itunes:duration" => current.duration = Some(value),
                                _ => {}
                            }
                        }
                    }
                    _ => {}
                }
                text.clear();
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if feed.title.is_empty() && feed.items.is_empty() {
        return Err(anyhow!("document has no channel title or items"));
    }
    Ok(feed)
}

fn element_name(start: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(start.name().as_ref()).into_owned()
}

fn read_enclosure(start: &BytesStart<'_>, item: Option<&mut FeedItem>) -> Result<()> {
    let Some(item) = item else {
        return Ok(());
    };
    if let Some(url) = start.try_get_attribute("url")? {
        item.enclosure_url = Some(url.unescape_value()?.into_owned());
    }
    Ok(())
}

/// Accepts plain seconds, `MM:SS` and `HH:MM:SS`. Anything else is 0.
pub(crate) fn sanitize_duration(raw: &str) -> u32 {
    let trimmed = raw.trim();
    if let Ok(seconds) = trimmed.parse::<u32>() {
        return seconds;
    }

    let mut total = 0_u32;
    for (i, part) in trimmed.rsplit(':').enumerate() {
        let Ok(value) = part.trim().parse::<u32>() else {
            return 0;
        };
        let scale = match i {
            0 => 1,
            1 => 60,
            2 => 3600,
            _ => return 0,
        };
        total = total.saturating_add(value.saturating_mul(scale));
    }
    total
}

pub(crate) fn parse_pub_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(raw.trim())
        .or_else(|_| DateTime::parse_from_rfc3339(raw.trim()))
        .ok()
        .map(|date| date.with_timezone(&Utc))
}

pub(crate) fn content_hash(guid: &str) -> String {
    format!("{:x}", md5::compute(guid.as_bytes()))
}

pub(crate) fn default_short_name(title: &str) -> String {
    title.trim().replace(' ', "-").to_lowercase()
}

/// Applies a fetched feed to `podcast`: takes over the channel title, adds
/// unseen episodes, refreshes durations and re-sorts newest first. Returns
/// the guids of the episodes that were added.
pub(crate) fn apply_feed(podcast: &mut Podcast, feed: &Feed) -> Vec<String> {
    if !feed.title.is_empty() {
        podcast.name = feed.title.clone();
    }
    if podcast.short_name.is_empty() {
        podcast.short_name = default_short_name(&feed.title);
    }

    let mut added = Vec::new();
    for item in &feed.items {
        let Some(url) = item.enclosure_url.as_deref() else {
            debug!(title = %item.title, "skipping feed item without enclosure");
            continue;
        };
        let guid = item.guid.clone().unwrap_or_else(|| url.to_string());
        let duration = item.duration.as_deref().map(sanitize_duration).unwrap_or(0);

        if let Some(existing) = podcast
            .episodes
            .iter_mut()
            .find(|episode| episode.guid == guid)
        {
            existing.duration = duration;
            continue;
        }

        let Some(date) = item.pub_date.as_deref().and_then(parse_pub_date) else {
            warn!(podcast = %podcast.short_name, title = %item.title, "skipping item with unreadable publish date");
            continue;
        };

        podcast.episodes.push(Episode {
            content_hash: content_hash(&guid),
            guid: guid.clone(),
            date,
            title: item.title.clone(),
            url: url.to_string(),
            duration,
            bookmark_time: Bookmark::Unplayed,
            listened: false,
            queued_up: false,
        });
        added.push(guid);
    }

    podcast.sort_episodes();
    added
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::EpisodeOrder;
    use crate::db::fixtures::podcast;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:itunes="http://www.itunes.com/dtds/podcast-1.0.dtd">
  <channel>
    <title>Morning &amp; Evening News</title>
    <image><title>logo title</title></image>
    <item>
      <title><![CDATA[Tuesday edition]]></title>
      <guid isPermaLink="false">news-0002</guid>
      <pubDate>Tue, 02 Jan 2024 06:00:00 +0000</pubDate>
      <enclosure url="https://cdn.example.test/0002.mp3?a=1&amp;b=2" type="audio/mpeg" length="1"/>
      <itunes:duration>1:02:03</itunes:duration>
    </item>
    <item>
      <title>Monday edition</title>
      <pubDate>Mon, 01 Jan 2024 06:00:00 +0000</pubDate>
      <enclosure url="https://cdn.example.test/0001.mp3" type="audio/mpeg"></enclosure>
      <itunes:duration>1500</itunes:duration>
    </item>
    <item>
      <title>Text only</title>
      <guid>news-text</guid>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn parse_feed_reads_channel_and_items() {
        let feed = parse_feed(SAMPLE).expect("feed should parse");
        assert_eq!(feed.title, "Morning & Evening News");
        assert_eq!(feed.items.len(), 3);

        let first = &feed.items[0];
        assert_eq!(first.title, "Tuesday edition");
        assert_eq!(first.guid.as_deref(), Some("news-0002"));
        assert_eq!(
            first.enclosure_url.as_deref(),
            Some("https://cdn.example.test/0002.mp3?a=1&b=2")
        );
        assert_eq!(first.duration.as_deref(), Some("1:02:03"));

        assert_eq!(feed.items[1].guid, None);
        assert_eq!(
            feed.items[1].enclosure_url.as_deref(),
            Some("https://cdn.example.test/0001.mp3")
        );
    }

    #[test]
    fn parse_feed_rejects_non_feed_documents() {
        assert!(parse_feed("<html><body>nope</body></html>").is_err());
        assert!(parse_feed("<rss><channel><title>x</title></item></rss>").is_err());
    }

    #[test]
    fn apply_feed_adds_sorted_episodes_and_updates_durations() {
        let feed = parse_feed(SAMPLE).expect("feed should parse");
        let mut show = podcast("", EpisodeOrder::NewestOnly, Vec::new());
        show.short_name.clear();

        let added = apply_feed(&mut show, &feed);
        assert_eq!(added, vec!["news-0002", "https://cdn.example.test/0001.mp3"]);
        assert_eq!(show.short_name, "morning-&-evening-news");
        assert_eq!(show.name, "Morning & Evening News");
        assert_eq!(show.episodes[0].guid, "news-0002");
        assert_eq!(show.episodes[0].duration, 3723);
        assert_eq!(show.episodes[0].content_hash, content_hash("news-0002"));
        assert_eq!(show.episodes[1].duration, 1500);

        let mut updated = feed.clone();
        updated.items[1].duration = Some("25:30".to_string());
        assert!(apply_feed(&mut show, &updated).is_empty());
        assert_eq!(show.episodes.len(), 2);
        assert_eq!(show.episodes[1].duration, 1530);
    }

    #[test]
    fn sanitize_duration_handles_common_formats() {
        assert_eq!(sanitize_duration("3600"), 3600);
        assert_eq!(sanitize_duration("45:10"), 2710);
        assert_eq!(sanitize_duration("01:00:05"), 3605);
        assert_eq!(sanitize_duration(""), 0);
        assert_eq!(sanitize_duration("about an hour"), 0);
        assert_eq!(sanitize_duration("1:2:3:4"), 0);
    }

    #[test]
    fn content_hash_is_hex_md5_of_guid() {
        assert_eq!(content_hash(""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(content_hash("news-0002").len(), 32);
    }

    #[test]
    fn parse_pub_date_accepts_rfc2822_and_rfc3339() {
        let a = parse_pub_date("Mon, 01 Jan 2024 06:00:00 +0000").expect("rfc2822");
        let b = parse_pub_date("2024-01-01T06:00:00Z").expect("rfc3339");
        assert_eq!(a, b);
        assert!(parse_pub_date("yesterday").is_none());
    }
}
