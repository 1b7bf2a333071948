#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;

use stayprice_core::browser::{BrowserError, BrowserResult, ElementRef, PageDriver, SessionFactory};
use stayprice_core::config::{ScraperConfig, SelectorSection};

pub const MESSAGE_NO_AVAILABILITY: &str =
    "This property has no availability on our site for your dates.";

/// What the results page shows after a submit.
#[derive(Debug, Clone, PartialEq)]
pub enum PageResult {
    Price(String),
    SoldOut,
    NoAvailabilityMessage,
    AlternateDates,
    /// Results render without a property card.
    NoCard { price: Option<String> },
    NoPrice,
    /// Texts served by individual price selectors (by position in the
    /// configured list) plus free text nodes for the page-wide scan.
    Layout {
        prices: Vec<(usize, String)>,
        text_nodes: Vec<String>,
    },
}

/// How a failing health probe fails.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProbeFailure {
    ConnectionLost,
    Unreadable,
}

#[derive(Debug, Clone)]
pub struct SiteScript {
    /// Autocomplete labels; `None` echoes whatever was typed.
    pub suggestions: Option<Vec<String>>,
    pub results: HashMap<NaiveDate, PageResult>,
    pub default_result: PageResult,
    pub picker_toggle: bool,
    pub missing_dates: Vec<NaiveDate>,
    pub submit_button: bool,
    /// The search input reports its value lowercased.
    pub lowercase_input: bool,
}

impl Default for SiteScript {
    fn default() -> Self {
        Self {
            suggestions: None,
            results: HashMap::new(),
            default_result: PageResult::Price("COP 250.000".to_string()),
            picker_toggle: true,
            missing_dates: Vec::new(),
            submit_button: true,
            lowercase_input: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Journal {
    pub sessions_created: usize,
    pub sessions_closed: usize,
    pub creation_failures: usize,
    pub navigations: Vec<String>,
    /// (selected hotel, checkin) per completed submit.
    pub submissions: Vec<(String, NaiveDate)>,
    pub connection_drops: usize,
    /// Every `locate` call with the timeout it was given.
    pub locate_timeouts: Vec<(String, Duration)>,
    pub url_reads: usize,
}

struct SiteInner {
    script: SiteScript,
    journal: Journal,
    pending_drops: HashMap<NaiveDate, usize>,
    failing_creations: usize,
    probe_failures: Vec<ProbeFailure>,
}

/// In-memory stand-in for the booking site and its remote browser provider.
#[derive(Clone)]
pub struct FakeSite {
    inner: Rc<RefCell<SiteInner>>,
    selectors: SelectorSection,
    price_selectors: Vec<String>,
}

impl FakeSite {
    pub fn new(config: &ScraperConfig, script: SiteScript) -> Self {
        Self {
            inner: Rc::new(RefCell::new(SiteInner {
                script,
                journal: Journal::default(),
                pending_drops: HashMap::new(),
                failing_creations: 0,
                probe_failures: Vec::new(),
            })),
            selectors: config.selectors.clone(),
            price_selectors: config.price.selectors.clone(),
        }
    }

    /// The connection dies `times` times when submitting a search for `checkin`.
    pub fn drop_connection_on(&self, checkin: NaiveDate, times: usize) {
        self.inner.borrow_mut().pending_drops.insert(checkin, times);
    }

    pub fn fail_creations(&self, count: usize) {
        self.inner.borrow_mut().failing_creations = count;
    }

    /// The next `times` URL reads fail with `kind`.
    pub fn fail_url_reads(&self, kind: ProbeFailure, times: usize) {
        self.inner
            .borrow_mut()
            .probe_failures
            .extend(std::iter::repeat(kind).take(times));
    }

    pub fn journal(&self) -> Journal {
        self.inner.borrow().journal.clone()
    }

    pub fn factory(&self) -> Rc<dyn SessionFactory> {
        Rc::new(self.clone())
    }

    pub fn driver(&self) -> FakeDriver {
        FakeDriver {
            id: "fake-direct".to_string(),
            site: Rc::clone(&self.inner),
            selectors: self.selectors.clone(),
            price_selectors: self.price_selectors.clone(),
            nodes: Vec::new(),
            generation: 0,
            url: "about:blank".to_string(),
            dead: false,
            closed: false,
            page: PageState::default(),
        }
    }
}

#[async_trait(?Send)]
impl SessionFactory for FakeSite {
    async fn create(&self) -> BrowserResult<Box<dyn PageDriver>> {
        let id = {
            let mut inner = self.inner.borrow_mut();
            if inner.failing_creations > 0 {
                inner.failing_creations -= 1;
                inner.journal.creation_failures += 1;
                return Err(BrowserError::Unexpected(
                    "remote browser refused the connection".to_string(),
                ));
            }
            inner.journal.sessions_created += 1;
            format!("fake-{}", inner.journal.sessions_created)
        };
        let mut driver = self.driver();
        driver.id = id;
        Ok(Box::new(driver))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Node {
    SearchInput,
    List,
    OptionItem(usize),
    Label(usize),
    Button(usize),
    Toggle,
    Calendar,
    Cell(NaiveDate),
    Submit,
    Card,
    Message,
    Carousel,
    Price(usize),
}

#[derive(Debug, Default)]
struct PageState {
    typed: String,
    hotel: Option<String>,
    picker_open: bool,
    picked: Vec<NaiveDate>,
    result: Option<PageResult>,
}

pub struct FakeDriver {
    id: String,
    site: Rc<RefCell<SiteInner>>,
    selectors: SelectorSection,
    price_selectors: Vec<String>,
    nodes: Vec<Node>,
    generation: u64,
    url: String,
    dead: bool,
    closed: bool,
    page: PageState,
}

impl FakeDriver {
    fn alive(&self) -> BrowserResult<()> {
        if self.dead {
            Err(BrowserError::ConnectionLost(
                "WebSocket connection closed by remote".to_string(),
            ))
        } else {
            Ok(())
        }
    }

    fn node(&self, handle: ElementRef) -> BrowserResult<Node> {
        self.alive()?;
        if handle.generation != self.generation {
            return Err(BrowserError::StaleElement(handle.to_string()));
        }
        self.nodes
            .get(handle.index)
            .copied()
            .ok_or_else(|| BrowserError::StaleElement(handle.to_string()))
    }

    fn register(&mut self, node: Node) -> ElementRef {
        self.nodes.push(node);
        ElementRef {
            generation: self.generation,
            index: self.nodes.len() - 1,
        }
    }

    fn labels(&self) -> Vec<String> {
        let inner = self.site.borrow();
        inner
            .script
            .suggestions
            .clone()
            .unwrap_or_else(|| vec![self.page.typed.clone()])
    }

    fn price_text(&self, idx: usize) -> Option<String> {
        match &self.page.result {
            Some(PageResult::Price(price)) | Some(PageResult::NoCard { price: Some(price) })
                if idx == 0 =>
            {
                Some(price.clone())
            }
            Some(PageResult::Layout { prices, .. }) => prices
                .iter()
                .find(|(at, _)| *at == idx)
                .map(|(_, text)| text.clone()),
            _ => None,
        }
    }

    fn cell_date(&self, selector: &str) -> Option<NaiveDate> {
        let (prefix, suffix) = self.selectors.calendar_cell.split_once("{date}")?;
        let raw = selector.strip_prefix(prefix)?.strip_suffix(suffix)?;
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
    }

    fn matching(&self, selector: &str) -> Vec<Node> {
        let s = &self.selectors;
        let inner = self.site.borrow();
        let result = self.page.result.as_ref();
        if selector == s.search_input {
            vec![Node::SearchInput]
        } else if selector == s.autocomplete_list {
            if self.page.typed.is_empty() {
                vec![]
            } else {
                vec![Node::List]
            }
        } else if selector == s.date_picker_toggle {
            if inner.script.picker_toggle {
                vec![Node::Toggle]
            } else {
                vec![]
            }
        } else if selector == s.date_picker_calendar {
            if self.page.picker_open {
                vec![Node::Calendar]
            } else {
                vec![]
            }
        } else if let Some(date) = self.cell_date(selector) {
            if self.page.picker_open && !inner.script.missing_dates.contains(&date) {
                vec![Node::Cell(date)]
            } else {
                vec![]
            }
        } else if selector == s.submit_button {
            if inner.script.submit_button {
                vec![Node::Submit]
            } else {
                vec![]
            }
        } else if selector == s.property_card {
            match result {
                Some(PageResult::NoCard { .. }) | None => vec![],
                Some(_) => vec![Node::Card],
            }
        } else if selector == s.unavailable_message {
            match result {
                Some(PageResult::NoAvailabilityMessage) => vec![Node::Message],
                _ => vec![],
            }
        } else if selector == s.alternate_dates {
            match result {
                Some(PageResult::AlternateDates) => vec![Node::Carousel],
                _ => vec![],
            }
        } else if let Some(idx) = self.price_selectors.iter().position(|p| p == selector) {
            if self.price_text(idx).is_some() {
                vec![Node::Price(idx)]
            } else {
                vec![]
            }
        } else {
            vec![]
        }
    }

    fn matching_within(&self, parent: Node, selector: &str) -> Vec<Node> {
        let s = &self.selectors;
        match parent {
            Node::List if selector == s.autocomplete_option => {
                (0..self.labels().len()).map(Node::OptionItem).collect()
            }
            Node::OptionItem(idx) if selector == s.autocomplete_label => vec![Node::Label(idx)],
            Node::OptionItem(idx) if selector == s.autocomplete_button => vec![Node::Button(idx)],
            _ => vec![],
        }
    }

    fn submit(&mut self) -> BrowserResult<()> {
        let checkin = self.page.picked.first().copied().ok_or_else(|| {
            BrowserError::Unexpected("submitted without dates".to_string())
        })?;
        let mut inner = self.site.borrow_mut();
        if let Some(remaining) = inner.pending_drops.get_mut(&checkin) {
            if *remaining > 0 {
                *remaining -= 1;
                inner.journal.connection_drops += 1;
                self.dead = true;
                return Err(BrowserError::ConnectionLost(
                    "WebSocket connection closed by remote".to_string(),
                ));
            }
        }
        let result = inner
            .script
            .results
            .get(&checkin)
            .cloned()
            .unwrap_or_else(|| inner.script.default_result.clone());
        let hotel = self.page.hotel.clone().unwrap_or_default();
        inner.journal.submissions.push((hotel, checkin));
        self.page.result = Some(result);
        Ok(())
    }
}

#[async_trait(?Send)]
impl PageDriver for FakeDriver {
    fn session_id(&self) -> &str {
        &self.id
    }

    async fn navigate(&mut self, url: &str) -> BrowserResult<()> {
        self.alive()?;
        self.nodes.clear();
        self.generation += 1;
        self.page = PageState::default();
        self.url = url.to_string();
        self.site.borrow_mut().journal.navigations.push(url.to_string());
        Ok(())
    }

    async fn wait_for_load_complete(&mut self, _timeout: Duration) -> BrowserResult<bool> {
        self.alive()?;
        Ok(true)
    }

    async fn current_url(&mut self) -> BrowserResult<String> {
        self.alive()?;
        let failure = {
            let mut inner = self.site.borrow_mut();
            inner.journal.url_reads += 1;
            if inner.probe_failures.is_empty() {
                None
            } else {
                Some(inner.probe_failures.remove(0))
            }
        };
        match failure {
            None => Ok(self.url.clone()),
            Some(ProbeFailure::ConnectionLost) => {
                self.dead = true;
                self.site.borrow_mut().journal.connection_drops += 1;
                Err(BrowserError::ConnectionLost(
                    "WebSocket connection closed by remote".to_string(),
                ))
            }
            Some(ProbeFailure::Unreadable) => Err(BrowserError::Unexpected(
                "Runtime.evaluate returned no result".to_string(),
            )),
        }
    }

    async fn locate(&mut self, selector: &str, timeout: Duration) -> BrowserResult<ElementRef> {
        self.alive()?;
        self.site
            .borrow_mut()
            .journal
            .locate_timeouts
            .push((selector.to_string(), timeout));
        match self.matching(selector).first().copied() {
            Some(node) => Ok(self.register(node)),
            None => Err(BrowserError::ElementNotFound(selector.to_string())),
        }
    }

    async fn locate_all(&mut self, selector: &str) -> BrowserResult<Vec<ElementRef>> {
        self.alive()?;
        let nodes = self.matching(selector);
        Ok(nodes.into_iter().map(|node| self.register(node)).collect())
    }

    async fn locate_within(
        &mut self,
        parent: ElementRef,
        selector: &str,
    ) -> BrowserResult<ElementRef> {
        let parent = self.node(parent)?;
        match self.matching_within(parent, selector).first().copied() {
            Some(node) => Ok(self.register(node)),
            None => Err(BrowserError::ElementNotFound(selector.to_string())),
        }
    }

    async fn locate_all_within(
        &mut self,
        parent: ElementRef,
        selector: &str,
    ) -> BrowserResult<Vec<ElementRef>> {
        let parent = self.node(parent)?;
        let nodes = self.matching_within(parent, selector);
        Ok(nodes.into_iter().map(|node| self.register(node)).collect())
    }

    async fn read_text(&mut self, element: ElementRef) -> BrowserResult<String> {
        let text = match self.node(element)? {
            Node::Label(idx) => format!("{}\nBogotá, Colombia", self.labels()[idx]),
            Node::Message => MESSAGE_NO_AVAILABILITY.to_string(),
            Node::Price(idx) => self.price_text(idx).unwrap_or_default(),
            _ => String::new(),
        };
        Ok(text)
    }

    async fn read_attribute(
        &mut self,
        element: ElementRef,
        name: &str,
    ) -> BrowserResult<Option<String>> {
        let node = self.node(element)?;
        let sold_out = node == Node::Card
            && name == self.selectors.sold_out_attribute
            && self.page.result == Some(PageResult::SoldOut);
        Ok(sold_out.then(|| self.selectors.sold_out_value.clone()))
    }

    async fn read_value(&mut self, element: ElementRef) -> BrowserResult<String> {
        match self.node(element)? {
            Node::SearchInput if self.site.borrow().script.lowercase_input => {
                Ok(self.page.typed.to_lowercase())
            }
            Node::SearchInput => Ok(self.page.typed.clone()),
            _ => Ok(String::new()),
        }
    }

    async fn click(&mut self, element: ElementRef) -> BrowserResult<()> {
        match self.node(element)? {
            Node::Button(idx) => {
                self.page.hotel = Some(self.labels()[idx].clone());
                Ok(())
            }
            Node::Toggle => {
                self.page.picker_open = true;
                Ok(())
            }
            Node::Cell(date) => {
                self.page.picked.push(date);
                Ok(())
            }
            Node::Submit => self.submit(),
            _ => Ok(()),
        }
    }

    async fn clear_and_type(&mut self, element: ElementRef, value: &str) -> BrowserResult<()> {
        if self.node(element)? == Node::SearchInput {
            // A new query starts a fresh search form.
            self.page = PageState {
                typed: value.to_string(),
                ..PageState::default()
            };
        }
        Ok(())
    }

    async fn is_visible(&mut self, element: ElementRef) -> BrowserResult<bool> {
        self.node(element)?;
        Ok(true)
    }

    async fn texts_containing(&mut self, needle: &str) -> BrowserResult<Vec<String>> {
        self.alive()?;
        match &self.page.result {
            Some(PageResult::Layout { text_nodes, .. }) => Ok(text_nodes
                .iter()
                .filter(|text| text.contains(needle))
                .cloned()
                .collect()),
            _ => Ok(Vec::new()),
        }
    }

    fn forget_elements(&mut self) {
        self.nodes.clear();
        self.generation += 1;
    }

    async fn close(&mut self) -> BrowserResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.site.borrow_mut().journal.sessions_closed += 1;
        self.alive()
    }
}

/// Defaults with every settle interval and backoff zeroed.
pub fn fast_config() -> ScraperConfig {
    let mut config = ScraperConfig::default();
    config.session.retry_backoff_seconds = 0;
    config.session.restart_delay_seconds = 0;
    config.session.landing_settle_seconds = 0;
    config.pacing.search_delay_seconds = 0;
    config.pacing.hotel_delay_seconds = 0;
    config.pacing.results_settle_seconds = 0;
    config.pacing.autocomplete_settle_ms = 0;
    config.pacing.picker_settle_ms = 0;
    config
}

pub fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 9, d).unwrap()
}
