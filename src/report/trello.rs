use std::collections::{BTreeMap, BTreeSet};

use log::debug;
use regex_lite::Regex;
use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_yaml::{Mapping, Value};

use crate::config::ConfigManager;

use super::{Checklist, ChecklistEntry, Report, ReportError, ReportUpdate, Reporter};

/// Config file holding the Trello credentials.
pub const TRELLO_CONFIG_FILE: &str = "trello.yml";

const TRELLO_API_URL: &str = "https://api.trello.com/1";

/// A card as returned by the tracker.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Card {
    pub id: String,
    #[serde(rename = "idChecklists", default)]
    pub checklist_ids: Vec<String>,
    #[serde(rename = "idList", default)]
    pub list_id: String,
}

/// A column on a board.
#[derive(Debug, Clone, Deserialize)]
pub struct BoardList {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CardChecklist {
    pub id: String,
    pub name: String,
    #[serde(rename = "checkItems", default)]
    pub check_items: Vec<CheckItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckItem {
    pub id: String,
    pub name: String,
    pub state: String,
}

impl CheckItem {
    pub fn is_complete(&self) -> bool {
        self.state == "complete"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemPosition {
    Top,
    Bottom,
}

impl ItemPosition {
    fn as_str(&self) -> &'static str {
        match self {
            ItemPosition::Top => "top",
            ItemPosition::Bottom => "bottom",
        }
    }
}

/// The card/checklist operations the reporter needs from the tracker.
/// Errors from the remote service are not absorbed anywhere in this
/// module; they propagate to the caller.
pub trait CardService {
    fn card(&self, card_id: &str) -> anyhow::Result<Card>;
    fn board_lists(&self, board_id: &str) -> anyhow::Result<Vec<BoardList>>;
    fn new_card(&self, name: &str, list_id: &str, description: &str) -> anyhow::Result<Card>;
    fn checklist(&self, checklist_id: &str) -> anyhow::Result<CardChecklist>;
    fn new_checklist(&self, card_id: &str, name: &str) -> anyhow::Result<()>;
    fn new_item(&self, checklist_id: &str, text: &str) -> anyhow::Result<()>;
    fn set_item_state(&self, card_id: &str, item_id: &str, complete: bool) -> anyhow::Result<()>;
    fn move_item(&self, card_id: &str, item_id: &str, position: ItemPosition)
        -> anyhow::Result<()>;
    fn rename_item(&self, card_id: &str, item_id: &str, text: &str) -> anyhow::Result<()>;
    fn update_description(&self, card_id: &str, description: &str) -> anyhow::Result<()>;
    fn move_card(&self, card_id: &str, list_id: &str) -> anyhow::Result<()>;
}

/// Thin client for the Trello REST API, authenticated with key/token
/// query parameters.
#[derive(Clone)]
pub struct TrelloApi {
    client: Client,
    key: String,
    token: String,
    base_url: String,
}

impl TrelloApi {
    pub fn new(key: impl Into<String>, token: impl Into<String>) -> anyhow::Result<Self> {
        Ok(TrelloApi {
            client: Client::builder().build()?,
            key: key.into(),
            token: token.into(),
            base_url: TRELLO_API_URL.to_string(),
        })
    }

    /// Build a client from the `api_key`/`token` pair in `trello.yml`.
    pub fn from_config() -> anyhow::Result<Self> {
        let manager = ConfigManager::load(&[TRELLO_CONFIG_FILE], &[], true)?;
        let key = manager
            .get("api_key")
            .and_then(Value::as_str)
            .ok_or(ReportError::MissingConfigKey("api_key"))?;
        let token = manager
            .get("token")
            .and_then(Value::as_str)
            .ok_or(ReportError::MissingConfigKey("token"))?;
        TrelloApi::new(key, token)
    }

    fn get<T: DeserializeOwned>(&self, path: &str) -> anyhow::Result<T> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .query(&[("key", &self.key), ("token", &self.token)])
            .send()?
            .error_for_status()?;
        Ok(response.json()?)
    }

    fn post<T: DeserializeOwned>(&self, path: &str, params: &[(&str, &str)]) -> anyhow::Result<T> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .query(&[("key", &self.key), ("token", &self.token)])
            .query(params)
            .send()?
            .error_for_status()?;
        Ok(response.json()?)
    }

    fn put(&self, path: &str, params: &[(&str, &str)]) -> anyhow::Result<()> {
        self.client
            .put(format!("{}{}", self.base_url, path))
            .query(&[("key", &self.key), ("token", &self.token)])
            .query(params)
            .send()?
            .error_for_status()?;
        Ok(())
    }
}

impl CardService for TrelloApi {
    fn card(&self, card_id: &str) -> anyhow::Result<Card> {
        self.get(&format!("/cards/{card_id}"))
    }

    fn board_lists(&self, board_id: &str) -> anyhow::Result<Vec<BoardList>> {
        self.get(&format!("/boards/{board_id}/lists"))
    }

    fn new_card(&self, name: &str, list_id: &str, description: &str) -> anyhow::Result<Card> {
        self.post(
            "/cards",
            &[("name", name), ("idList", list_id), ("desc", description)],
        )
    }

    fn checklist(&self, checklist_id: &str) -> anyhow::Result<CardChecklist> {
        self.get(&format!("/checklists/{checklist_id}"))
    }

    fn new_checklist(&self, card_id: &str, name: &str) -> anyhow::Result<()> {
        let _: serde_json::Value = self.post(&format!("/cards/{card_id}/checklists"), &[("name", name)])?;
        Ok(())
    }

    fn new_item(&self, checklist_id: &str, text: &str) -> anyhow::Result<()> {
        let _: serde_json::Value =
            self.post(&format!("/checklists/{checklist_id}/checkItems"), &[("name", text)])?;
        Ok(())
    }

    fn set_item_state(&self, card_id: &str, item_id: &str, complete: bool) -> anyhow::Result<()> {
        let state = if complete { "complete" } else { "incomplete" };
        self.put(
            &format!("/cards/{card_id}/checkItem/{item_id}"),
            &[("state", state)],
        )
    }

    fn move_item(
        &self,
        card_id: &str,
        item_id: &str,
        position: ItemPosition,
    ) -> anyhow::Result<()> {
        self.put(
            &format!("/cards/{card_id}/checkItem/{item_id}"),
            &[("pos", position.as_str())],
        )
    }

    fn rename_item(&self, card_id: &str, item_id: &str, text: &str) -> anyhow::Result<()> {
        self.put(
            &format!("/cards/{card_id}/checkItem/{item_id}"),
            &[("name", text)],
        )
    }

    fn update_description(&self, card_id: &str, description: &str) -> anyhow::Result<()> {
        self.put(&format!("/cards/{card_id}"), &[("desc", description)])
    }

    fn move_card(&self, card_id: &str, list_id: &str) -> anyhow::Result<()> {
        self.put(&format!("/cards/{card_id}"), &[("idList", list_id)])
    }
}

/// Board wiring for card reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrelloConfig {
    pub board_id: String,
    pub new_column: String,
    pub close_column: String,
}

impl TrelloConfig {
    pub fn from_mapping(config: &Mapping) -> Result<Self, ReportError> {
        let field = |key: &'static str| {
            config
                .get(key)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or(ReportError::MissingConfigKey(key))
        };
        Ok(TrelloConfig {
            board_id: field("board_id")?,
            new_column: field("new_column")?,
            close_column: field("close_column")?,
        })
    }
}

/// Checklist items encode an optional link as markdown: `[name](url)`.
/// Text without a bracket is a bare name with no link. Text with a
/// bracket that does not match the pattern is kept as a bare name so the
/// item stays tracked; see DESIGN.md.
fn parse_item_text(text: &str) -> (String, String) {
    if text.contains('[') {
        let re = Regex::new(r"\[(.+)\]\((.*)\)").unwrap();
        if let Some(captures) = re.captures(text) {
            return (captures[1].to_string(), captures[2].to_string());
        }
        debug!("Checklist item text is not a well-formed link: {text}");
    }
    (text.to_string(), String::new())
}

fn encode_item_text(entry: &ChecklistEntry) -> String {
    if entry.link.is_empty() {
        entry.name.clone()
    } else {
        format!("[{}]({})", entry.name, entry.link)
    }
}

#[derive(Debug, Clone)]
struct ItemState {
    id: String,
    complete: bool,
    link: String,
}

#[derive(Debug, Clone, Default)]
struct ChecklistState {
    id: String,
    items: BTreeMap<String, ItemState>,
}

/// Report backed by a card on a Trello board. The card's checklists are
/// indexed on construction and re-indexed after every update.
pub struct TrelloCard<A: CardService> {
    api: A,
    card_id: String,
    close_column: String,
    card: Card,
    checklists: BTreeMap<String, ChecklistState>,
}

impl<A: CardService> TrelloCard<A> {
    /// Create a new card in the configured new column and attach to it.
    pub fn new(
        api: A,
        title: &str,
        description: &str,
        config: &TrelloConfig,
    ) -> anyhow::Result<Self> {
        let (new_column, close_column) = board_columns(&api, config)?;
        let card = api.new_card(title, &new_column, description)?;
        Self::attach(api, &card.id, close_column)
    }

    /// Attach to an existing card by id.
    pub fn get(api: A, report_id: &str, config: &TrelloConfig) -> anyhow::Result<Self> {
        let (_, close_column) = board_columns(&api, config)?;
        Self::attach(api, report_id, close_column)
    }

    fn attach(api: A, card_id: &str, close_column: String) -> anyhow::Result<Self> {
        let mut card = TrelloCard {
            api,
            card_id: card_id.to_string(),
            close_column,
            card: Card::default(),
            checklists: BTreeMap::new(),
        };
        card.refresh()?;
        Ok(card)
    }

    fn refresh(&mut self) -> anyhow::Result<()> {
        self.card = self.api.card(&self.card_id)?;
        self.checklists = index_checklists(&self.api, &self.card)?;
        Ok(())
    }

    /// Bring the card's checklists in line with the desired state.
    ///
    /// Additions, completions, and resurfacing all happen in alphabetical
    /// order so runs are deterministic. Checked items that are no longer
    /// wanted sink to the bottom of the list.
    fn reconcile(&mut self, desired: &Checklist) -> anyhow::Result<()> {
        for (list_name, entries) in desired {
            if !self.checklists.contains_key(list_name) {
                self.api.new_checklist(&self.card_id, list_name)?;
                self.refresh()?;
            }
            let Some(current) = self.checklists.get(list_name) else {
                continue;
            };

            let incoming: BTreeMap<&str, &ChecklistEntry> = entries
                .iter()
                .map(|entry| (entry.name.as_str(), entry))
                .collect();
            let on_card: BTreeSet<&str> = current.items.keys().map(String::as_str).collect();
            let checked: BTreeSet<&str> = current
                .items
                .iter()
                .filter(|(_, item)| item.complete)
                .map(|(name, _)| name.as_str())
                .collect();

            // new failures, never pre-checked
            for (name, entry) in &incoming {
                if !on_card.contains(name) {
                    self.api.new_item(&current.id, &encode_item_text(entry))?;
                }
            }

            // no longer wanted and not yet checked off
            for name in on_card.difference(&checked) {
                if !incoming.contains_key(name) {
                    let item = &current.items[*name];
                    self.api.set_item_state(&self.card_id, &item.id, true)?;
                }
            }

            // back again after being checked off: uncheck and surface
            for name in checked.intersection(&on_card) {
                if incoming.contains_key(name) {
                    let item = &current.items[*name];
                    self.api.set_item_state(&self.card_id, &item.id, false)?;
                    self.api
                        .move_item(&self.card_id, &item.id, ItemPosition::Top)?;
                }
            }

            // link changed: rewrite the item text, checked or not
            for name in on_card.iter() {
                if let Some(entry) = incoming.get(name) {
                    let item = &current.items[*name];
                    if item.link != entry.link {
                        self.api
                            .rename_item(&self.card_id, &item.id, &encode_item_text(entry))?;
                    }
                }
            }

            // recently resolved sinks to the bottom
            for name in checked.iter() {
                if !incoming.contains_key(name) {
                    let item = &current.items[*name];
                    self.api
                        .move_item(&self.card_id, &item.id, ItemPosition::Bottom)?;
                }
            }
        }
        Ok(())
    }
}

fn board_columns<A: CardService>(
    api: &A,
    config: &TrelloConfig,
) -> anyhow::Result<(String, String)> {
    let columns: BTreeMap<String, String> = api
        .board_lists(&config.board_id)?
        .into_iter()
        .map(|list| (list.name, list.id))
        .collect();
    let lookup = |name: &str| {
        columns
            .get(name)
            .cloned()
            .ok_or_else(|| ReportError::UnknownColumn(name.to_string()))
    };
    Ok((lookup(&config.new_column)?, lookup(&config.close_column)?))
}

fn index_checklists<A: CardService>(
    api: &A,
    card: &Card,
) -> anyhow::Result<BTreeMap<String, ChecklistState>> {
    let mut checklists = BTreeMap::new();
    for checklist_id in &card.checklist_ids {
        let data = api.checklist(checklist_id)?;
        let mut items = BTreeMap::new();
        for item in data.check_items {
            let (name, link) = parse_item_text(&item.name);
            items.insert(
                name,
                ItemState {
                    id: item.id.clone(),
                    complete: item.is_complete(),
                    link,
                },
            );
        }
        checklists.insert(
            data.name,
            ChecklistState {
                id: data.id,
                items,
            },
        );
    }
    Ok(checklists)
}

impl<A: CardService> Report for TrelloCard<A> {
    fn report_id(&self) -> &str {
        &self.card_id
    }

    fn update(&mut self, update: &ReportUpdate) -> anyhow::Result<()> {
        if let Some(description) = &update.description {
            self.api.update_description(&self.card_id, description)?;
        }
        if let Some(checklist) = &update.checklist {
            self.reconcile(checklist)?;
        }
        self.refresh()
    }

    /// Force-complete every checklist item and park the card in the
    /// close column.
    fn close(&mut self) -> anyhow::Result<()> {
        let clear: Checklist = self
            .checklists
            .keys()
            .map(|name| (name.clone(), Vec::new()))
            .collect();
        self.reconcile(&clear)?;

        if self.card.list_id != self.close_column {
            self.api.move_card(&self.card_id, &self.close_column)?;
        }
        Ok(())
    }
}

/// Factory for card reports on one configured board.
pub struct TrelloReporter {
    api: TrelloApi,
    config: TrelloConfig,
}

impl TrelloReporter {
    pub fn new(api: TrelloApi, config: TrelloConfig) -> Self {
        TrelloReporter { api, config }
    }

    pub fn from_config(config: &Mapping) -> anyhow::Result<Self> {
        Ok(TrelloReporter {
            api: TrelloApi::from_config()?,
            config: TrelloConfig::from_mapping(config)?,
        })
    }
}

impl Reporter for TrelloReporter {
    fn new_report(&self, title: &str, description: &str) -> anyhow::Result<Box<dyn Report>> {
        Ok(Box::new(TrelloCard::new(
            self.api.clone(),
            title,
            description,
            &self.config,
        )?))
    }

    fn get_report(&self, report_id: &str) -> anyhow::Result<Box<dyn Report>> {
        Ok(Box::new(TrelloCard::get(
            self.api.clone(),
            report_id,
            &self.config,
        )?))
    }
}
