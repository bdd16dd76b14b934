//! Job-based progress layer. Elements typed `job` become startable jobs;
//! progress accrues during update scaled by the softcap-resolved rate.

use std::collections::BTreeMap;

use contracts::{EventRecord, EventType, IntentRecord, LayerDef};
use serde_json::{json, Value};

use crate::bus::EventDraft;
use crate::error::EngineError;
use crate::layer::{Layer, LayerContext};
use crate::noderef::ParsedNodeRef;

pub const PROGRESS_LAYER_TYPE: &str = "progressLayer";

const JOB_ELEMENT_TYPE: &str = "job";
const BASE_RATE: f64 = 1.0;
const JOB_DURATION_SECONDS: f64 = 1.0;

pub fn progress_layer_factory(def: &LayerDef) -> Box<dyn Layer> {
    Box::new(ProgressLayer::from_def(def))
}

#[derive(Debug, Clone)]
struct JobState {
    target_ref: String,
    active: bool,
    progress: f64,
    completions: u64,
}

#[derive(Debug)]
pub struct ProgressLayer {
    id: String,
    jobs: BTreeMap<String, JobState>,
}

impl ProgressLayer {
    fn from_def(def: &LayerDef) -> Self {
        let mut jobs = BTreeMap::new();
        let layer_ref = ParsedNodeRef::layer(&def.id);
        for sublayer in &def.sublayers {
            let sublayer_ref = layer_ref.child(1, &sublayer.id);
            for section in &sublayer.sections {
                let section_ref = sublayer_ref.child(2, &section.id);
                for element in &section.elements {
                    if element.element_type != JOB_ELEMENT_TYPE {
                        continue;
                    }
                    jobs.insert(
                        element.id.clone(),
                        JobState {
                            target_ref: section_ref.child(3, &element.id).format(),
                            active: false,
                            progress: 0.0,
                            completions: 0,
                        },
                    );
                }
            }
        }
        Self { id: def.id.clone(), jobs }
    }

    fn write_job(
        &self,
        job_id: &str,
        ctx: &mut LayerContext<'_>,
    ) -> Result<(), EngineError> {
        let Some(job) = self.jobs.get(job_id) else {
            return Ok(());
        };
        ctx.set_own(
            &format!("jobs.{job_id}"),
            json!({
                "active": job.active,
                "progress": job.progress,
                "completions": job.completions,
            }),
        )
    }

    fn jobs_value(&self) -> Value {
        let entries: serde_json::Map<String, Value> = self
            .jobs
            .iter()
            .map(|(job_id, job)| {
                (
                    job_id.clone(),
                    json!({
                        "targetRef": job.target_ref,
                        "active": job.active,
                        "progress": job.progress,
                        "completions": job.completions,
                    }),
                )
            })
            .collect();
        Value::Object(entries)
    }
}

impl Layer for ProgressLayer {
    fn id(&self) -> &str {
        &self.id
    }

    fn type_name(&self) -> &str {
        PROGRESS_LAYER_TYPE
    }

    fn init(&mut self, ctx: &mut LayerContext<'_>) -> Result<(), EngineError> {
        let job_ids: Vec<String> = self.jobs.keys().cloned().collect();
        for job_id in job_ids {
            self.write_job(&job_id, ctx)?;
        }
        Ok(())
    }

    fn update(&mut self, dt: f64, ctx: &mut LayerContext<'_>) -> Result<(), EngineError> {
        let mut completed = Vec::new();
        for (job_id, job) in self.jobs.iter_mut() {
            if !job.active {
                continue;
            }
            let rate = ctx.resolve_modifier(&job.target_ref, "rate", BASE_RATE);
            job.progress += dt * rate;
            if job.progress >= JOB_DURATION_SECONDS {
                job.progress -= JOB_DURATION_SECONDS;
                job.completions += 1;
                completed.push((job_id.clone(), job.target_ref.clone(), job.completions));
            }
        }

        for (job_id, target_ref, completions) in completed {
            ctx.publish(EventDraft::new(
                EventType::JobCompleted,
                json!({"targetRef": target_ref, "jobId": job_id, "completions": completions}),
            ))?;
            self.write_job(&job_id, ctx)?;
        }
        let active_ids: Vec<String> = self
            .jobs
            .iter()
            .filter(|(_, job)| job.active)
            .map(|(job_id, _)| job_id.clone())
            .collect();
        for job_id in active_ids {
            self.write_job(&job_id, ctx)?;
        }
        Ok(())
    }

    fn on_event(
        &mut self,
        event: &EventRecord,
        ctx: &mut LayerContext<'_>,
    ) -> Result<(), EngineError> {
        // A reset of this layer's state invalidates in-memory job progress.
        if event.event_type == EventType::LayerResetExecuted
            && event.payload.get("layerId").and_then(Value::as_str) == Some(self.id.as_str())
        {
            for job in self.jobs.values_mut() {
                job.active = false;
                job.progress = 0.0;
                job.completions = 0;
            }
            let job_ids: Vec<String> = self.jobs.keys().cloned().collect();
            for job_id in job_ids {
                self.write_job(&job_id, ctx)?;
            }
        }
        Ok(())
    }

    fn destroy(&mut self, _ctx: &mut LayerContext<'_>) -> Result<(), EngineError> {
        self.jobs.clear();
        Ok(())
    }

    fn view_model(&self, _ctx: &LayerContext<'_>) -> Value {
        json!({"jobs": self.jobs_value()})
    }

    fn handled_intents(&self) -> &[&'static str] {
        &["START_JOB", "STOP_JOB"]
    }

    fn on_intent(
        &mut self,
        intent: &IntentRecord,
        ctx: &mut LayerContext<'_>,
    ) -> Result<Value, EngineError> {
        let job_id = intent
            .payload
            .get("jobId")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let Some(job) = self.jobs.get_mut(&job_id) else {
            return Ok(json!({"jobId": job_id, "accepted": false, "reason": "unknown job"}));
        };

        match intent.intent_type.as_str() {
            "START_JOB" => {
                let target_ref = job.target_ref.clone();
                job.active = true;
                self.write_job(&job_id, ctx)?;
                ctx.publish(EventDraft::new(
                    EventType::JobStarted,
                    json!({"targetRef": target_ref, "jobId": job_id}),
                ))?;
                Ok(json!({"jobId": job_id, "accepted": true}))
            }
            "STOP_JOB" => {
                let target_ref = job.target_ref.clone();
                job.active = false;
                self.write_job(&job_id, ctx)?;
                ctx.publish(EventDraft::new(
                    EventType::JobStopped,
                    json!({"targetRef": target_ref, "jobId": job_id}),
                ))?;
                Ok(json!({"jobId": job_id, "accepted": true}))
            }
            _ => Ok(json!({"jobId": job_id, "accepted": false, "reason": "unsupported intent"})),
        }
    }
}
