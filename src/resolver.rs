//! The orchestrator: validate, check cache, select an upstream, forward,
//! transform the response (CNAME flattening / AAAA suppression), cache, and
//! reply. Grounded on the teacher's `src/resolver.rs` top-level resolve loop
//! and, for the flattening algorithm itself, on the live code path in
//! `examples/original_source/dns_proxy/dns_resolver.py`'s
//! `_flatten_cname_chain`.

use std::net::SocketAddr;
use std::time::Duration;

use tracing::{debug, warn};

use crate::cache::{CacheKey, DnsCache};
use crate::dns::message::rcode;
use crate::dns::{DNSResourceClass, DNSResourceType, Message, RData, ResourceRecord};
use crate::health::{ProbeOutcome, StartupGrace};
use crate::rate_limiter::RateLimiter;
use crate::selector::Selector;
use crate::upstream::UpstreamClient;
use crate::validation::{self, Transport};

/// Upstream attempts per query, including the first: §4.8 step 5.
const MAX_UPSTREAM_ATTEMPTS: usize = 3;
const STATS_QUERY_NAME: &str = "_dns-proxy-stats.local";

pub struct ResolverConfig {
    pub default_ttl_s: u32,
    pub max_ttl_s: u32,
    pub negative_ttl_s: u32,
    pub aaaa_suppression: bool,
    pub upstream_timeout: Duration,
}

pub struct Resolver {
    cache: DnsCache,
    rate_limiter: RateLimiter,
    selector: Selector,
    upstream_client: UpstreamClient,
    startup_grace: StartupGrace,
    config: ResolverConfig,
}

impl Resolver {
    pub fn new(
        cache: DnsCache,
        rate_limiter: RateLimiter,
        selector: Selector,
        startup_grace: StartupGrace,
        config: ResolverConfig,
    ) -> Self {
        Resolver {
            cache,
            rate_limiter,
            selector,
            upstream_client: UpstreamClient::new(),
            startup_grace,
            config,
        }
    }

    pub fn cache(&self) -> &DnsCache {
        &self.cache
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    pub fn startup_grace(&self) -> &StartupGrace {
        &self.startup_grace
    }

    /// Top-level entry point for a transport listener. Returns `None` if the
    /// raw bytes fail the transport's pre-decode size bounds, the client is
    /// rate-limited (query silently dropped, §7), or the incoming bytes are
    /// too malformed to even recover an id for a FORMERR reply.
    pub async fn handle_query(&self, raw: &[u8], client: SocketAddr, transport: Transport) -> Option<Vec<u8>> {
        if let Err(err) = validation::validate_raw_size(raw.len(), transport) {
            debug!(%client, error = %err, "query dropped: raw size out of bounds");
            return None;
        }

        if !self.rate_limiter.is_allowed(client.ip()) {
            debug!(%client, "query dropped: rate limited");
            return None;
        }

        let query = match Message::decode(raw) {
            Ok(message) => message,
            Err(err) => {
                warn!(%client, error = %err, "failed to decode query");
                return None;
            }
        };

        if let Err(err) = validation::validate_query(&query) {
            warn!(%client, error = %err, "query failed validation");
            return Some(self.error_response(&query, rcode::FORMAT_ERROR));
        }

        let response = match self.resolve(&query, transport).await {
            Ok(response) => response,
            Err(err) => {
                warn!(%client, error = %err, "resolution failed");
                self.error_response(&query, err.to_rcode().unwrap_or(rcode::SERVER_FAILURE))
            }
        };

        Some(response)
    }

    /// Encodes `message`, truncating per §4.9 only when the reply will
    /// travel over UDP; TCP responses are never subject to the 512-byte cap.
    fn encode_for_transport(&self, mut message: Message, transport: Transport) -> crate::error::Result<Vec<u8>> {
        match transport {
            Transport::Udp => message.truncate_for_udp(validation::UDP_MAX_SIZE).map_err(Into::into),
            Transport::Tcp => message.encode().map_err(Into::into),
        }
    }

    async fn resolve(&self, query: &Message, transport: Transport) -> crate::error::Result<Vec<u8>> {
        let question = query
            .first_question()
            .ok_or_else(|| crate::error::ProxyError::InvalidName(String::new()))?
            .clone();
        let qname = question.name();

        if qname.eq_ignore_ascii_case(STATS_QUERY_NAME) && question.qtype == DNSResourceType::TXT {
            return self.stats_response(query, transport);
        }

        let cache_key = CacheKey::new(&qname, question.qtype, question.qclass);

        if let Some(cached) = self.cache.get(&cache_key) {
            let mut response = cached;
            response.header.id = query.header.id;
            response.header.rd = query.header.rd;
            response.questions = query.questions.clone();
            return self.encode_for_transport(response, transport);
        }

        let candidates = self.selector.select_multiple(MAX_UPSTREAM_ATTEMPTS);
        if candidates.is_empty() {
            return Err(crate::error::ProxyError::NoUpstreamAvailable);
        }

        let mut last_err = None;

        for upstream in candidates {
            let timeout = upstream.timeout.min(self.config.upstream_timeout);
            match self.upstream_client.query(upstream.addr, query, timeout).await {
                Ok((response, rtt)) => {
                    upstream
                        .health
                        .record(ProbeOutcome::Success { rtt }, self.startup_grace.in_grace());
                    return self.finish(query, &question, &cache_key, response, transport);
                }
                Err(err) => {
                    upstream
                        .health
                        .record(ProbeOutcome::Failure, self.startup_grace.in_grace());
                    last_err = Some(err);
                }
            }
        }

        Err(last_err.unwrap_or(crate::error::ProxyError::NoUpstreamAvailable))
    }

    fn finish(
        &self,
        query: &Message,
        question: &crate::dns::DNSQuestion,
        cache_key: &CacheKey,
        upstream_response: Message,
        transport: Transport,
    ) -> crate::error::Result<Vec<u8>> {
        validation::validate_response(&upstream_response).map_err(|_| {
            crate::error::ProxyError::MalformedUpstreamResponse(crate::dns::ParseError::CountMismatch)
        })?;

        let is_address_query = question.qtype.is_address();
        let has_cname = upstream_response.any_cname_anywhere();

        let mut transformed = if is_address_query && has_cname {
            self.flatten_cname_chain(&upstream_response, question)
        } else {
            self.strip_and_suppress(upstream_response, question)
        };

        let ttl = self.response_ttl(&transformed);

        transformed.header.id = query.header.id;
        transformed.header.qr = true;
        transformed.header.ra = true;
        transformed.header.rd = query.header.rd;
        transformed.questions = query.questions.clone();

        self.cache.set(cache_key.clone(), transformed.clone(), ttl);

        self.encode_for_transport(transformed, transport)
    }

    /// §4.8 CNAME flattening: only the live path confirmed against the
    /// original resolver is implemented (tail-TTL, no chain-walking/requery).
    fn flatten_cname_chain(&self, response: &Message, question: &crate::dns::DNSQuestion) -> Message {
        let want_type = question.qtype;
        let tails: Vec<&ResourceRecord> = response
            .answers
            .iter()
            .filter(|rr| rr.rtype() == want_type)
            .collect();

        if tails.is_empty() {
            warn!(qname = %question.name(), "CNAME chain has no terminal address record");
            let mut empty = response.clone();
            empty.clear_authority_and_additional();
            empty.answers.clear();
            return empty;
        }

        let qname = question.name();
        let mut flattened = Vec::with_capacity(tails.len());
        for tail in &tails {
            if self.config.aaaa_suppression {
                if want_type == DNSResourceType::A && tail.rtype() == DNSResourceType::AAAA {
                    continue;
                }
                if want_type == DNSResourceType::AAAA && tail.rtype() == DNSResourceType::A {
                    continue;
                }
            }
            flattened.push(ResourceRecord::new(&qname, tail.rclass, tail.ttl, tail.rdata.clone()));
        }

        let mut result = response.clone();
        result.answers = flattened;
        result.clear_authority_and_additional();
        result
    }

    /// Non-CNAME path: drop CNAMEs if the query is non-address, and apply
    /// AAAA suppression across all sections per §4.8 step 6.
    fn strip_and_suppress(&self, mut response: Message, question: &crate::dns::DNSQuestion) -> Message {
        let is_address_query = question.qtype.is_address();

        if !is_address_query {
            response.strip_type_from_all_sections(DNSResourceType::CNAME);
        }

        if self.config.aaaa_suppression && (question.qtype == DNSResourceType::A || !is_address_query) {
            response.strip_type_from_all_sections(DNSResourceType::AAAA);
        }

        response
    }

    fn response_ttl(&self, response: &Message) -> u32 {
        if response.answers.is_empty() {
            return self.config.negative_ttl_s;
        }
        let min_ttl = response
            .answers
            .iter()
            .map(|rr| rr.ttl)
            .min()
            .unwrap_or(self.config.default_ttl_s);
        min_ttl.min(self.config.max_ttl_s)
    }

    fn stats_response(&self, query: &Message, transport: Transport) -> crate::error::Result<Vec<u8>> {
        let mut response = Message::new_response(query, rcode::NO_ERROR);
        for upstream in self.selector.upstreams() {
            let snapshot = upstream.health.stats();
            let text = format!(
                "name={} healthy={} total={} success_rate={:.3} avg_ms={:?} score={:.3}",
                upstream.name,
                snapshot.healthy,
                snapshot.total,
                snapshot.success_rate,
                snapshot.avg_latency_ms,
                snapshot.health_score
            );
            response.answers.push(ResourceRecord::new(
                STATS_QUERY_NAME,
                DNSResourceClass::IN,
                0,
                RData::TXT(vec![text.into_bytes()]),
            ));
        }
        self.encode_for_transport(response, transport)
    }

    fn error_response(&self, query: &Message, rcode: u8) -> Vec<u8> {
        let response = Message::new_response(query, rcode);
        response.encode().unwrap_or_else(|_| {
            // header-only fallback: question couldn't be round-tripped
            let mut header = query.header.clone();
            header.qr = true;
            header.rcode = rcode;
            header.qdcount = 0;
            header.ancount = 0;
            header.nscount = 0;
            header.arcount = 0;
            header.encode().map(|bytes| bytes.to_vec()).unwrap_or_default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::{DNSHeader, DNSQuestion};
    use std::net::Ipv4Addr;

    fn question(qtype: DNSResourceType) -> DNSQuestion {
        DNSQuestion {
            labels: vec!["example".to_string(), "com".to_string()],
            qtype,
            qclass: DNSResourceClass::IN,
        }
    }

    fn cname_chain_response() -> Message {
        Message {
            header: DNSHeader::default(),
            questions: vec![question(DNSResourceType::A)],
            answers: vec![
                ResourceRecord::new(
                    "example.com",
                    DNSResourceClass::IN,
                    300,
                    RData::CNAME(vec!["x".into(), "test".into()]),
                ),
                ResourceRecord::new(
                    "x.test",
                    DNSResourceClass::IN,
                    300,
                    RData::CNAME(vec!["y".into(), "test".into()]),
                ),
                ResourceRecord::new("y.test", DNSResourceClass::IN, 60, RData::A(Ipv4Addr::new(1, 2, 3, 4))),
                ResourceRecord::new("y.test", DNSResourceClass::IN, 60, RData::A(Ipv4Addr::new(1, 2, 3, 5))),
            ],
            authorities: vec![],
            additional: vec![],
        }
    }

    fn test_resolver(aaaa_suppression: bool) -> Resolver {
        Resolver::new(
            DnsCache::new(100, 0.0, Duration::from_secs(300)),
            RateLimiter::new(1000.0, 1000, Duration::from_secs(300)),
            Selector::new(vec![], crate::selector::SelectionStrategy::RoundRobin),
            StartupGrace::new(Duration::from_secs(0)),
            ResolverConfig {
                default_ttl_s: 300,
                max_ttl_s: 3600,
                negative_ttl_s: 60,
                aaaa_suppression,
                upstream_timeout: Duration::from_secs(5),
            },
        )
    }

    #[test]
    fn flattens_cname_chain_to_direct_address_records() {
        let resolver = test_resolver(false);
        let response = cname_chain_response();
        let q = question(DNSResourceType::A);
        let flattened = resolver.flatten_cname_chain(&response, &q);

        assert_eq!(flattened.answers.len(), 2);
        for rr in &flattened.answers {
            assert_eq!(rr.name(), "example.com");
            assert_eq!(rr.ttl, 60);
            assert!(matches!(rr.rdata, RData::A(_)));
        }
        assert!(flattened.authorities.is_empty());
        assert!(flattened.additional.is_empty());
    }

    #[test]
    fn empty_chain_without_tail_logs_and_returns_empty_answer() {
        let resolver = test_resolver(false);
        let mut response = cname_chain_response();
        response.answers.retain(|rr| rr.rtype() == DNSResourceType::CNAME);
        let q = question(DNSResourceType::A);
        let flattened = resolver.flatten_cname_chain(&response, &q);
        assert!(flattened.answers.is_empty());
    }

    #[test]
    fn aaaa_suppression_drops_aaaa_tails_on_a_query() {
        let resolver = test_resolver(true);
        let mut response = cname_chain_response();
        response.answers.push(ResourceRecord::new(
            "y.test",
            DNSResourceClass::IN,
            60,
            RData::AAAA("::1".parse().unwrap()),
        ));
        let q = question(DNSResourceType::A);
        let flattened = resolver.flatten_cname_chain(&response, &q);
        assert!(flattened.answers.iter().all(|rr| rr.rtype() == DNSResourceType::A));
    }

    #[test]
    fn negative_ttl_used_when_answer_empty() {
        let resolver = test_resolver(false);
        let response = Message {
            header: DNSHeader::default(),
            questions: vec![question(DNSResourceType::A)],
            answers: vec![],
            authorities: vec![],
            additional: vec![],
        };
        assert_eq!(resolver.response_ttl(&response), 60);
    }

    #[test]
    fn positive_ttl_is_min_of_answers_capped_at_max() {
        let resolver = test_resolver(false);
        let response = Message {
            header: DNSHeader::default(),
            questions: vec![question(DNSResourceType::A)],
            answers: vec![
                ResourceRecord::new(
                    "example.com",
                    DNSResourceClass::IN,
                    10_000,
                    RData::A(Ipv4Addr::new(1, 1, 1, 1)),
                ),
                ResourceRecord::new("example.com", DNSResourceClass::IN, 120, RData::A(Ipv4Addr::new(1, 1, 1, 2))),
            ],
            authorities: vec![],
            additional: vec![],
        };
        assert_eq!(resolver.response_ttl(&response), 120);
    }
}
